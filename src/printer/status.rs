use super::packet::{checksum, HEAD, TAIL};

/// Command byte of the notification that reports a finished page.
pub const PAGE_COMPLETE: u8 = 0xd3;

/// Head (2) + command + length + checksum + tail (2).
const FRAME_OVERHEAD: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("The response is too short ({0} bytes).")]
    TooShort(usize),

    #[error("The response has the wrong head mark ({0:02x?}).")]
    WrongHead([u8; 2]),

    #[error("The response announces {expected} payload bytes, but carries {actual}.")]
    WrongLength { expected: usize, actual: usize },

    #[error("The response checksum is wrong (expected {expected:#04x}, got {actual:#04x}).")]
    WrongChecksum { expected: u8, actual: u8 },

    #[error("The response has the wrong tail mark ({0:02x?}).")]
    WrongTail([u8; 2]),
}

/// A framed notification from the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < FRAME_OVERHEAD {
            return Err(Error::TooShort(raw.len()));
        }

        // Check head mark and length.
        if raw[..2] != HEAD {
            return Err(Error::WrongHead([raw[0], raw[1]]));
        }

        let command = raw[2];
        let expected = raw[3] as usize;
        let actual = raw.len() - FRAME_OVERHEAD;

        if expected != actual {
            return Err(Error::WrongLength { expected, actual });
        }

        let payload = &raw[4..4 + expected];
        let sum = raw[4 + expected];

        if sum != checksum(command, payload) {
            return Err(Error::WrongChecksum {
                expected: checksum(command, payload),
                actual: sum,
            });
        }

        let tail = [raw[5 + expected], raw[6 + expected]];

        if tail != TAIL {
            return Err(Error::WrongTail(tail));
        }

        Ok(Self {
            command,
            payload: payload.to_vec(),
        })
    }

    pub fn is_page_complete(&self) -> bool {
        self.command == PAGE_COMPLETE
    }
}

/// Cheap check on raw notification bytes, framed or not.
pub fn is_page_complete(raw: &[u8]) -> bool {
    raw.get(2) == Some(&PAGE_COMPLETE)
}
