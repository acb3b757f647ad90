//! Hosts file format parser.
//!
//! Parses standard `/etc/hosts` files into the keyed mapping consumed by
//! [`SystemHosts`](super::SystemHosts).

use std::collections::HashSet;
use std::io::BufRead;

/// Error type for hosts file parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// I/O error during reading.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Parser for hosts file format.
///
/// # Format
///
/// - `<ip> <name1> [name2] [name3]...`
/// - Comments start with `#`, either on their own line or after an entry
/// - Empty lines and lines with a single field are ignored
///
/// # Output
///
/// Each name yields a `"name:4"` or `"name:6"` key (by the IP family)
/// mapped to the IP. When the same key appears twice, the first line wins.
/// Names are kept verbatim, so `*.dev.lan` or `^api\d+\.lan$` reach the
/// pattern matcher untouched.
///
/// # Example
///
/// ```
/// use hostgate::hosts::HostsFileParser;
/// use std::io::BufReader;
///
/// let content = "127.0.0.1 localhost\n::1 localhost\n10.0.0.5 db.lan db";
/// let mapping = HostsFileParser.parse(&mut BufReader::new(content.as_bytes())).unwrap();
/// assert_eq!(mapping[0], ("localhost:4".to_string(), "127.0.0.1".to_string()));
/// assert_eq!(mapping[1], ("localhost:6".to_string(), "::1".to_string()));
/// assert_eq!(mapping.len(), 4);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HostsFileParser;

impl HostsFileParser {
    /// Parse hosts file content into `(key, ip)` pairs in file order.
    pub fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<(String, String)>, ParseError> {
        let mut mapping = Vec::new();
        let mut seen = HashSet::new();
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }

            // Remove comments
            let content = line.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }

            let mut parts = content.split_whitespace();
            let Some(ip) = parts.next() else {
                continue;
            };
            let family = if ip.contains(':') { 6 } else { 4 };

            for name in parts {
                let key = format!("{name}:{family}");
                if seen.insert(key.clone()) {
                    mapping.push((key, ip.to_string()));
                }
            }
        }

        Ok(mapping)
    }
}
