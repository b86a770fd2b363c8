//! Persistent player progress (unlocked stages, high score).
//!
//! File layout, little-endian:
//!
//! ```text
//! [u8 magic; 8] [u32 checksum] [command*]
//! command = [u8 cmd] [u16 size] [size bytes of payload]
//! ```
//!
//! The checksum covers the whole command array. Unknown commands are skipped
//! by their declared size, so old builds can read files written by newer
//! ones. A bad checksum or bad magic means the file is ignored wholesale;
//! corruption here must never take the game down.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const MAGIC: [u8; 8] = [0x00, 0x67, 0x74, 0x66, 0x6f, 0xe3, 0x83, 0x84];
const CRC_SEED: u32 = 0xB16B00B5;

const CMD_UNLOCK_STAGES: u8 = 0x01;
const CMD_HISCORE: u8 = 0x02;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub unlocked_stages: BTreeSet<u16>,
    pub hiscore: u32,
}

#[derive(Debug)]
pub enum ProgressError {
    Io(String),
}

impl fmt::Display for ProgressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "progress IO error: {}", msg),
        }
    }
}

fn checksum(buf: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(CRC_SEED);
    hasher.update(buf);
    hasher.finalize()
}

impl Progress {
    /// Decode a progress blob. Corrupt or unrecognized data degrades to the
    /// default progress instead of failing.
    pub fn decode(bytes: &[u8]) -> Progress {
        let mut progress = Progress::default();

        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            tracing::warn!("progress file has invalid header, ignoring");
            return progress;
        }

        let rest = &bytes[MAGIC.len()..];
        if rest.len() < 4 {
            // empty command array, checksum omitted
            return progress;
        }

        let stored = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let commands = &rest[4..];

        if checksum(commands) != stored {
            tracing::warn!("progress file has bad checksum, ignoring");
            return progress;
        }

        let mut cur = Cursor::new(commands);
        while (cur.position() as usize) < commands.len() {
            let cmd = match cur.read_u8() {
                Ok(c) => c,
                Err(_) => break,
            };
            let size = match cur.read_u16::<LittleEndian>() {
                Ok(s) => s as usize,
                Err(_) => break,
            };
            let mut payload = vec![0u8; size];
            if cur.read_exact(&mut payload).is_err() {
                tracing::warn!("progress command {:#x} truncated, ignoring rest", cmd);
                break;
            }

            match cmd {
                CMD_UNLOCK_STAGES => {
                    let mut p = Cursor::new(&payload);
                    while let Ok(stage) = p.read_u16::<LittleEndian>() {
                        progress.unlocked_stages.insert(stage);
                    }
                }
                CMD_HISCORE => {
                    let mut p = Cursor::new(&payload);
                    if let Ok(score) = p.read_u32::<LittleEndian>() {
                        progress.hiscore = progress.hiscore.max(score);
                    }
                }
                _ => {
                    tracing::warn!("unknown progress command {:#x}, skipping {} bytes", cmd, size);
                }
            }
        }

        progress
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut commands = Vec::new();

        if !self.unlocked_stages.is_empty() {
            commands.write_u8(CMD_UNLOCK_STAGES).unwrap();
            commands
                .write_u16::<LittleEndian>((self.unlocked_stages.len() * 2) as u16)
                .unwrap();
            for stage in &self.unlocked_stages {
                commands.write_u16::<LittleEndian>(*stage).unwrap();
            }
        }

        commands.write_u8(CMD_HISCORE).unwrap();
        commands.write_u16::<LittleEndian>(4).unwrap();
        commands.write_u32::<LittleEndian>(self.hiscore).unwrap();

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + commands.len());
        out.write_all(&MAGIC).unwrap();
        out.write_u32::<LittleEndian>(checksum(&commands)).unwrap();
        out.write_all(&commands).unwrap();
        out
    }

    pub fn load(path: &Path) -> Progress {
        match std::fs::read(path) {
            Ok(bytes) => Progress::decode(&bytes),
            Err(e) => {
                tracing::info!("no progress file at {}: {}", path.display(), e);
                Progress::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ProgressError> {
        std::fs::write(path, self.encode()).map_err(|e| ProgressError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut p = Progress::default();
        p.unlocked_stages.extend([1u16, 2, 5]);
        p.hiscore = 1_234_567;
        let back = Progress::decode(&p.encode());
        assert_eq!(back, p);
    }

    #[test]
    fn test_bad_magic_ignored() {
        let p = Progress::decode(b"definitely not a progress file");
        assert_eq!(p, Progress::default());
    }

    #[test]
    fn test_bad_checksum_ignored() {
        let mut good = Progress::default();
        good.unlocked_stages.insert(3);
        let mut bytes = good.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(Progress::decode(&bytes), Progress::default());
    }

    #[test]
    fn test_unknown_command_skipped() {
        let mut p = Progress::default();
        p.unlocked_stages.insert(7);
        p.hiscore = 99;

        // splice an unknown command in front of the real ones
        let encoded = p.encode();
        let commands = &encoded[12..];
        let mut spliced = Vec::new();
        spliced.write_u8(0x7E).unwrap();
        spliced.write_u16::<LittleEndian>(3).unwrap();
        spliced.write_all(&[0xAA, 0xBB, 0xCC]).unwrap();
        spliced.write_all(commands).unwrap();

        let mut bytes = Vec::new();
        bytes.write_all(&MAGIC).unwrap();
        bytes.write_u32::<LittleEndian>(checksum(&spliced)).unwrap();
        bytes.write_all(&spliced).unwrap();

        assert_eq!(Progress::decode(&bytes), p);
    }

    #[test]
    fn test_empty_command_array() {
        let p = Progress::decode(&MAGIC);
        assert_eq!(p, Progress::default());
    }
}
