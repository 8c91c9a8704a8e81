//! Command batch encoding.
//!
//! The command file is plain text, one command per line. The bridge never
//! interprets commands; the typed [`Command`] variants only exist so the
//! convenience calls build their payloads in one place.

use std::fmt;

use fbridge_core::{BridgeError, Result};

/// Content written to the stop-flag file.
pub const STOP_SENTINEL: &str = "STOP";

/// A single line of the command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `READ <address>`
    Read { address: String },
    /// `WRITE <address> <value>`
    Write { address: String, value: String },
    /// `MODULE <module>`
    ModuleBase { module: String },
    /// `POINTER <base> <offset>...`
    Pointer { base: String, offsets: Vec<String> },
    /// Anything else, passed through verbatim.
    Raw(String),
}

impl Command {
    pub fn read(address: impl Into<String>) -> Self {
        Self::Read {
            address: address.into(),
        }
    }

    pub fn write(address: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Write {
            address: address.into(),
            value: value.into(),
        }
    }

    pub fn module_base(module: impl Into<String>) -> Self {
        Self::ModuleBase {
            module: module.into(),
        }
    }

    pub fn pointer<I, S>(base: impl Into<String>, offsets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Pointer {
            base: base.into(),
            offsets: offsets.into_iter().map(Into::into).collect(),
        }
    }

    /// The record key the interpreter is expected to answer under.
    pub fn response_key(&self) -> &str {
        match self {
            Self::Read { address } | Self::Write { address, .. } => address,
            Self::ModuleBase { module } => module,
            Self::Pointer { base, .. } => base,
            Self::Raw(line) => line,
        }
    }

    /// Checks that the command fits on one line and names a target.
    pub fn validate(&self) -> Result<()> {
        let target = self.response_key().trim();
        if target.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "command target must not be empty".to_string(),
            ));
        }
        validate_line(&self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { address } => write!(f, "READ {address}"),
            Self::Write { address, value } => write!(f, "WRITE {address} {value}"),
            Self::ModuleBase { module } => write!(f, "MODULE {module}"),
            Self::Pointer { base, offsets } => {
                write!(f, "POINTER {base}")?;
                for offset in offsets {
                    write!(f, " {offset}")?;
                }
                Ok(())
            }
            Self::Raw(line) => f.write_str(line),
        }
    }
}

/// Formats `<module>+0x<OFFSET>` with an upper-case hex offset.
pub fn module_offset_address(module: &str, offset: u64) -> String {
    format!("{module}+0x{offset:X}")
}

fn validate_line(line: &str) -> Result<()> {
    if line.trim().is_empty() {
        return Err(BridgeError::InvalidArgument(
            "command must not be blank".to_string(),
        ));
    }
    if line.contains(&['\n', '\r'][..]) {
        return Err(BridgeError::InvalidArgument(format!(
            "command must be a single line: {line:?}"
        )));
    }
    Ok(())
}

/// Joins a batch into command-file content, one command per line.
///
/// Fails on an empty batch or on any command that is blank or spans lines,
/// since either would desynchronize the line-oriented channel.
pub fn encode_batch<S: AsRef<str>>(commands: &[S]) -> Result<String> {
    if commands.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "empty command batch".to_string(),
        ));
    }

    let mut payload = String::new();
    for command in commands {
        let line = command.as_ref();
        validate_line(line)?;
        payload.push_str(line);
        payload.push('\n');
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        assert_eq!(Command::read("game.exe+0x10").to_string(), "READ game.exe+0x10");
        assert_eq!(Command::write("0x1234", "99").to_string(), "WRITE 0x1234 99");
        assert_eq!(Command::module_base("game.exe").to_string(), "MODULE game.exe");
        assert_eq!(
            Command::pointer("game.exe+0x12AB40", ["18", "20"]).to_string(),
            "POINTER game.exe+0x12AB40 18 20"
        );
        assert_eq!(Command::Raw("PING".to_string()).to_string(), "PING");
    }

    #[test]
    fn test_response_key() {
        assert_eq!(Command::read("A").response_key(), "A");
        assert_eq!(Command::write("B", "1").response_key(), "B");
        assert_eq!(Command::module_base("m.dll").response_key(), "m.dll");
        assert_eq!(Command::pointer("P", ["1"]).response_key(), "P");
    }

    #[test]
    fn test_module_offset_address() {
        assert_eq!(module_offset_address("game.exe", 0x12ab40), "game.exe+0x12AB40");
        assert_eq!(module_offset_address("m.dll", 0), "m.dll+0x0");
    }

    #[test]
    fn test_validate_rejects_empty_target() {
        assert!(matches!(
            Command::read("  ").validate(),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_rejects_embedded_newline() {
        assert!(Command::write("A", "1\nREAD B").validate().is_err());
        assert!(Command::read("A").validate().is_ok());
    }

    #[test]
    fn test_encode_batch_one_per_line() {
        let payload = encode_batch(&["READ A", "READ B"]).unwrap();
        assert_eq!(payload, "READ A\nREAD B\n");
    }

    #[test]
    fn test_encode_batch_rejects_empty() {
        let empty: [&str; 0] = [];
        let err = encode_batch(&empty).unwrap_err();
        assert!(format!("{err}").contains("empty command batch"));
    }

    #[test]
    fn test_encode_batch_rejects_multiline_command() {
        assert!(encode_batch(&["READ A\r\nREAD B"]).is_err());
        assert!(encode_batch(&["READ A", ""]).is_err());
    }
}
