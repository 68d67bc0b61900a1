//! Permission bitflags
//!
//! Each capability has a fixed bit so values from different tree levels can
//! be OR'd together and compared against what an action requires. The bit
//! positions are stored in shadow files and must not change.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permission: u32 {
        const READ =             1 << 0;
        const WRITE =            1 << 1;
        /// Traverse a directory or run a file
        const EXECUTE =          1 << 2;
        /// Compile and load a file as a game object
        const LOAD =             1 << 3;
        const CREATE_FILE =      1 << 4;
        const CREATE_DIRECTORY = 1 << 5;
        const DELETE_DIRECTORY = 1 << 6;
        const CHANGE_PERMS =     1 << 7;
        const CHANGE_OWNER =     1 << 8;
        const TAKE_OWNERSHIP =   1 << 9;
        /// Resolved through a dynamic (regex) lookup
        const SPECIAL =          1 << 10;
        /// Omitted from directory listings
        const HIDDEN =           1 << 11;
        const INHERITS =         1 << 12;
    }
}

/// Permission characters in display order.
const CHARS: [(char, Permission); 13] = [
    ('r', Permission::READ),
    ('w', Permission::WRITE),
    ('x', Permission::EXECUTE),
    ('l', Permission::LOAD),
    ('c', Permission::CREATE_FILE),
    ('C', Permission::CREATE_DIRECTORY),
    ('D', Permission::DELETE_DIRECTORY),
    ('P', Permission::CHANGE_PERMS),
    ('O', Permission::CHANGE_OWNER),
    ('T', Permission::TAKE_OWNERSHIP),
    ('S', Permission::SPECIAL),
    ('H', Permission::HIDDEN),
    ('+', Permission::INHERITS),
];

impl Permission {
    /// Parse a permission string such as `"rwx"` or `"r-x--"`.
    ///
    /// `-` and spaces are placeholders and ignored; any other unknown
    /// character is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut perms = Permission::empty();
        for ch in text.chars() {
            if ch == '-' || ch == ' ' {
                continue;
            }
            let (_, flag) = CHARS.iter().find(|(c, _)| *c == ch).ok_or_else(|| {
                Error::Config(format!("unknown permission character '{ch}' in \"{text}\""))
            })?;
            perms |= *flag;
        }
        Ok(perms)
    }

    /// Format as a permission string; empty permissions format as `-`.
    pub fn to_perm_string(self) -> String {
        let out: String = CHARS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(c, _)| *c)
            .collect();
        if out.is_empty() { "-".to_string() } else { out }
    }

    /// True when every bit of `required` is granted.
    pub fn allows(self, required: Permission) -> bool {
        self.contains(required)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_perm_string())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Permission::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid permission bits {bits:#x}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions() {
        assert_eq!(Permission::READ.bits(), 1);
        assert_eq!(Permission::LOAD.bits(), 8);
        assert_eq!(Permission::INHERITS.bits(), 1 << 12);
        assert_eq!(Permission::all().bits(), (1 << 13) - 1);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Permission::parse("rwx").unwrap(),
            Permission::READ | Permission::WRITE | Permission::EXECUTE
        );
        assert_eq!(Permission::parse("r-x").unwrap(), Permission::READ | Permission::EXECUTE);
        assert_eq!(Permission::parse("").unwrap(), Permission::empty());
        assert_eq!(Permission::parse("cC").unwrap(), Permission::CREATE_FILE | Permission::CREATE_DIRECTORY);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = Permission::parse("rq").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_to_perm_string() {
        let perms = Permission::parse("lrw").unwrap();
        assert_eq!(perms.to_perm_string(), "rwl");
        assert_eq!(Permission::empty().to_string(), "-");
        assert_eq!(Permission::parse(&Permission::all().to_perm_string()).unwrap(), Permission::all());
    }

    #[test]
    fn test_serde_as_bits() {
        let json = serde_json::to_string(&(Permission::READ | Permission::WRITE)).unwrap();
        assert_eq!(json, "3");
        let perms: Permission = serde_json::from_str("5").unwrap();
        assert_eq!(perms, Permission::READ | Permission::EXECUTE);
        assert!(serde_json::from_str::<Permission>("8192").is_err());
    }
}
