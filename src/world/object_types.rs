use crate::entities::item::ItemTypeId;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectTypeError {
    #[error("failed to read object definitions {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("object definitions line {line}: {message}")]
    Syntax { line: usize, message: String },
}

fn syntax(line: usize, message: impl Into<String>) -> ObjectTypeError {
    ObjectTypeError::Syntax {
        line,
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttribute {
    pub key: String,
    pub value: String,
}

/// One `TypeID` block of an object definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    pub id: ItemTypeId,
    pub name: String,
    pub flags: Vec<String>,
    pub attributes: Vec<ObjectAttribute>,
}

impl ObjectType {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags
            .iter()
            .any(|value| value.eq_ignore_ascii_case(flag))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key.eq_ignore_ascii_case(key))
            .map(|attr| attr.value.as_str())
    }

    pub fn attribute_u16(&self, key: &str) -> Option<u16> {
        self.attribute(key)
            .and_then(|value| value.trim().parse::<u16>().ok())
    }

    pub fn attribute_u8(&self, key: &str) -> Option<u8> {
        self.attribute_u16(key)
            .and_then(|value| u8::try_from(value).ok())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ObjectTypeIndex {
    types: HashMap<ItemTypeId, ObjectType>,
}

impl ObjectTypeIndex {
    pub fn get(&self, id: ItemTypeId) -> Option<&ObjectType> {
        self.types.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemTypeId, &ObjectType)> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

pub fn load_object_types(path: &Path) -> Result<ObjectTypeIndex, ObjectTypeError> {
    let content = std::fs::read_to_string(path).map_err(|source| ObjectTypeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_object_types(&content)
}

pub fn parse_object_types(content: &str) -> Result<ObjectTypeIndex, ObjectTypeError> {
    let mut index = ObjectTypeIndex::default();
    let mut current: Option<ObjectType> = None;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let (key, value) = parse_assignment(line, line_no)?;
        if key == "TypeID" {
            if let Some(entry) = current.take() {
                insert_type(&mut index, entry, line_no)?;
            }
            let id = value
                .parse::<u16>()
                .map_err(|_| syntax(line_no, "invalid TypeID"))?;
            current = Some(ObjectType {
                id: ItemTypeId(id),
                name: String::new(),
                flags: Vec::new(),
                attributes: Vec::new(),
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            return Err(syntax(line_no, "entry before TypeID"));
        };
        match key {
            "Name" => entry.name = parse_quoted_string(value, line_no)?,
            "Flags" => entry.flags = parse_braced_list(value, line_no)?,
            "Attributes" => entry.attributes = parse_attributes(value, line_no)?,
            _ => {}
        }
    }

    if let Some(entry) = current.take() {
        insert_type(&mut index, entry, content.lines().count())?;
    }

    Ok(index)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_assignment(line: &str, line_no: usize) -> Result<(&str, &str), ObjectTypeError> {
    let (key, value) = line
        .split_once('=')
        .ok_or_else(|| syntax(line_no, "missing '='"))?;
    Ok((key.trim(), value.trim()))
}

fn parse_quoted_string(value: &str, line_no: usize) -> Result<String, ObjectTypeError> {
    let Some(rest) = value.strip_prefix('"') else {
        return Ok(value.to_string());
    };
    let end = rest
        .find('"')
        .ok_or_else(|| syntax(line_no, "missing closing quote in Name"))?;
    Ok(rest[..end].to_string())
}

fn parse_braced_list(value: &str, line_no: usize) -> Result<Vec<String>, ObjectTypeError> {
    let start = value.find('{').ok_or_else(|| syntax(line_no, "missing '{'"))?;
    let end = value.rfind('}').ok_or_else(|| syntax(line_no, "missing '}'"))?;
    if end <= start {
        return Err(syntax(line_no, "invalid braces"));
    }
    Ok(value[start + 1..end]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_attributes(value: &str, line_no: usize) -> Result<Vec<ObjectAttribute>, ObjectTypeError> {
    Ok(parse_braced_list(value, line_no)?
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
            let key = key.trim();
            (!key.is_empty()).then(|| ObjectAttribute {
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect())
}

fn insert_type(
    index: &mut ObjectTypeIndex,
    entry: ObjectType,
    line_no: usize,
) -> Result<(), ObjectTypeError> {
    if index.types.contains_key(&entry.id) {
        return Err(syntax(line_no, format!("duplicate TypeID {}", entry.id.0)));
    }
    index.types.insert(entry.id, entry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FuzzRng(u64);

    impl FuzzRng {
        fn next_u32(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
            (self.0 >> 32) as u32
        }

        fn gen_ascii(&mut self, len: usize) -> String {
            (0..len)
                .map(|_| ((self.next_u32() % 95) as u8 + 0x20) as char)
                .collect()
        }
    }

    #[test]
    fn parses_flags_and_attributes() {
        let content = "\
# ground
TypeID = 102
Name = \"grass\"
Flags = {Bank}
Attributes = {Waypoints=150}

TypeID = 1270
Name = \"stone wall\"   # blocks everything
Flags = {Unpass, Unthrow, Avoid}
";
        let index = parse_object_types(content).expect("parse");
        assert_eq!(index.len(), 2);
        let grass = index.get(ItemTypeId(102)).expect("grass");
        assert_eq!(grass.name, "grass");
        assert!(grass.has_flag("bank"));
        assert_eq!(grass.attribute_u16("Waypoints"), Some(150));
        let wall = index.get(ItemTypeId(1270)).expect("wall");
        assert!(wall.has_flag("Unthrow"));
        assert!(wall.attributes.is_empty());
    }

    #[test]
    fn duplicate_and_orphan_entries_are_errors() {
        let duplicate = "TypeID = 5\nTypeID = 5\n";
        assert!(matches!(
            parse_object_types(duplicate),
            Err(ObjectTypeError::Syntax { line: 2, .. })
        ));
        assert!(parse_object_types("Name = \"x\"\n").is_err());
    }

    #[test]
    fn garbage_input_never_panics() {
        let mut rng = FuzzRng(0xa11c_e55e_0000_0001);
        let mut content = String::new();
        for i in 0..200 {
            if i % 15 == 0 {
                content.push_str("TypeID = 100\nName = \"Test\"\nFlags = {Unpass}\n");
                continue;
            }
            let len = (rng.next_u32() % 120) as usize;
            content.push_str(&rng.gen_ascii(len));
            content.push('\n');
        }
        let _ = parse_object_types(&content);
    }
}
