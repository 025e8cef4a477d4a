//! Key to server mapping

use crate::{McwireError, Result};

/// Picks the server responsible for a key
pub trait ServerSelector: Send + Sync {
    fn select<'a>(&self, servers: &'a [String], key: &[u8]) -> Result<&'a str>;
}

/// CRC32 of the key, modulo the number of servers
#[derive(Debug, Clone, Copy, Default)]
pub struct ModulusSelector;

impl ServerSelector for ModulusSelector {
    fn select<'a>(&self, servers: &'a [String], key: &[u8]) -> Result<&'a str> {
        match servers.len() {
            0 => Err(McwireError::NoServers),
            1 => Ok(&servers[0]),
            n => {
                let checksum = crc32fast::hash(key) as usize;
                Ok(&servers[checksum % n])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{i}:11211")).collect()
    }

    #[test]
    fn test_no_servers() {
        assert!(matches!(
            ModulusSelector.select(&[], b"k"),
            Err(McwireError::NoServers)
        ));
    }

    #[test]
    fn test_single_server() {
        let list = servers(1);
        assert_eq!(ModulusSelector.select(&list, b"anything").unwrap(), list[0]);
    }

    #[test]
    fn test_stable_and_spread() {
        let list = servers(4);
        let first = ModulusSelector.select(&list, b"/foo").unwrap();
        assert_eq!(ModulusSelector.select(&list, b"/foo").unwrap(), first);

        let expected = list[crc32fast::hash(b"/foo") as usize % 4].as_str();
        assert_eq!(first, expected);

        let hit: std::collections::HashSet<&str> = (0..64)
            .map(|i| ModulusSelector.select(&list, format!("key{i}").as_bytes()).unwrap())
            .collect();
        assert!(hit.len() > 1);
    }
}
