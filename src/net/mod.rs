pub mod framing;
pub mod game;
pub mod game_client;
pub mod login;
pub mod packet;
pub mod session;
pub mod trace;
pub mod transport;
pub mod ws;
pub mod xtea;
