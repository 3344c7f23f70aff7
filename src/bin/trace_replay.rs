use std::collections::BTreeMap;
use std::sync::Arc;
use tibia_client::net::game::{ProtocolDecoder, ProtocolFeatures};
use tibia_client::net::trace::{parse_trace_line, TraceDirection};
use tibia_client::world::item_types::ItemTypeIndex;
use tibia_client::world::state::ClientState;
use tibia_client::world::time::GameClock;
use tibia_client::world::viewport::AwareRange;

fn run(args: &[String]) -> Result<(), String> {
    let path = args
        .get(1)
        .ok_or_else(|| "usage: trace_replay <packet_trace.log> [objects.srv]".to_string())?;
    let types = match args.get(2) {
        Some(types) => ItemTypeIndex::load(std::path::Path::new(types)).map_err(|err| err.to_string())?,
        None => ItemTypeIndex::default(),
    };
    let text = std::fs::read_to_string(path).map_err(|err| format!("read {path}: {err}"))?;

    let mut state = ClientState::new(Arc::new(types), AwareRange::default(), GameClock::manual());
    let mut decoder = ProtocolDecoder::new(ProtocolFeatures::legacy());
    let mut skipped_client = 0usize;
    let mut skipped_truncated = 0usize;
    let mut malformed = 0usize;
    let mut failures: BTreeMap<String, usize> = BTreeMap::new();
    let mut last_ts = None;

    for (idx, line) in text.lines().enumerate() {
        let record = match parse_trace_line(line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("line {}: {}", idx + 1, err);
                malformed += 1;
                continue;
            }
        };
        if record.direction == TraceDirection::In {
            skipped_client += 1;
            continue;
        }
        if !record.is_complete() {
            skipped_truncated += 1;
            continue;
        }
        if let Some(last) = last_ts {
            state.clock.advance(record.timestamp.saturating_sub(last));
        }
        last_ts = Some(record.timestamp);
        let report = decoder.decode_frame(&mut state, &record.data);
        if let Some(err) = report.error {
            *failures.entry(err.to_string()).or_default() += 1;
        }
        state.tick();
    }

    let stats = decoder.stats();
    println!("frames decoded: {}", stats.frames);
    println!("messages: {}", stats.messages);
    println!("unknown opcodes: {}", stats.unknown_opcodes);
    println!("decode errors: {}", stats.errors);
    println!(
        "skipped client/truncated/malformed: {}/{}/{}",
        skipped_client, skipped_truncated, malformed
    );
    println!("central position: {}", state.map.central_position());
    println!(
        "tiles/creatures/containers: {}/{}/{}",
        state.map.tile_count(),
        state.map.creature_count(),
        state.containers.len()
    );
    println!("events queued: {}", state.events.len());
    for (error, count) in failures {
        println!("- {count}x {error}");
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Err(err) = run(&args) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
