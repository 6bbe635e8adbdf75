/// Commands a client may request. The discriminant is the wire byte, and a
/// successful request echoes it back as the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Status = 0,
    OpenFront = 1,
    OpenRear = 2,
    Shutdown = 3,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Command::Status),
            1 => Some(Command::OpenFront),
            2 => Some(Command::OpenRear),
            3 => Some(Command::Shutdown),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The two addressable actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorIndex {
    Front,
    Rear,
}

impl std::fmt::Display for DoorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoorIndex::Front => write!(f, "front"),
            DoorIndex::Rear => write!(f, "rear"),
        }
    }
}
