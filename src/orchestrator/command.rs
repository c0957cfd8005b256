//! Console command grammar

use uuid::Uuid;

/// Length of the canonical hyphenated form, `8-4-4-4-12`
const CANONICAL_UUID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartBroker,
    StopBroker,
    StartPassive,
    StopDevice,
    StartActive,
    RequestData(Uuid),
}

impl Command {
    /// Resolves a console line. Anything outside the grammar yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(id) = parse_device_id(line) {
            return Some(Command::RequestData(id));
        }
        match line {
            "1" => Some(Command::StartBroker),
            "2" => Some(Command::StopBroker),
            "3" => Some(Command::StartPassive),
            "4" => Some(Command::StopDevice),
            "5" => Some(Command::StartActive),
            _ => None,
        }
    }
}

/// Accepts only the canonical hyphenated UUID form, in any letter case
pub fn parse_device_id(raw: &str) -> Option<Uuid> {
    if raw.len() != CANONICAL_UUID_LEN {
        return None;
    }
    Uuid::try_parse(raw).ok()
}

pub const MENU: &str = "\
1 -> start broker
2 -> stop broker
3 -> start passive device
4 -> stop most recent device
5 -> start active device
<device uuid> -> request data from an active device";
