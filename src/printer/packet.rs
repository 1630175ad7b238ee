use super::{Error, LabelType};

/// Every packet starts with this marker ...
pub const HEAD: [u8; 2] = [0x55, 0x55];

/// ... and ends with that one.
pub const TAIL: [u8; 2] = [0xaa, 0xaa];

/// Out-of-band byte sent in front of the Connect packet.
pub const CONNECT_PREFIX: u8 = 0x03;

/// The length field is a single byte.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Row bitmap header: row (2), black pixel count (3, zero = "total mode"), repeat (1).
const BITMAP_ROW_HEADER: usize = 6;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Heartbeat,
    SetDensity,
    SetLabelType,
    PrintStart,
    PageStart,
    SetPageSize,
    PrintEmptyRows,
    PrintBitmapRow,
    PageEnd,
    PrintEnd,
}

impl Command {
    pub const fn code(self) -> u8 {
        use Command::*;

        match self {
            Connect | Heartbeat => 0xdc,
            SetDensity => 0x21,
            SetLabelType => 0x23,
            PrintStart => 0x01,
            PageStart => 0x03,
            SetPageSize => 0x13,
            PrintEmptyRows => 0x84,
            PrintBitmapRow => 0x85,
            PageEnd => 0xe3,
            PrintEnd => 0xf3,
        }
    }

    /// Row streaming is fire-and-forget. Everything else waits for a notification.
    pub const fn expects_ack(self) -> bool {
        !matches!(self, Command::PrintEmptyRows | Command::PrintBitmapRow)
    }
}

/// A printer command together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    Connect,
    Heartbeat,
    SetDensity(u8),
    SetLabelType(LabelType),
    PrintStart,
    PageStart,
    SetPageSize { width: u16, height: u16 },
    PrintEmptyRows { row: u16, count: u8 },
    /// `data` uses the bitmap convention (1 = white) and is inverted on the wire.
    PrintBitmapRow { row: u16, repeat: u8, data: &'a [u8] },
    PageEnd,
    PrintEnd,
}

impl Request<'_> {
    pub fn command(&self) -> Command {
        match self {
            Request::Connect => Command::Connect,
            Request::Heartbeat => Command::Heartbeat,
            Request::SetDensity(_) => Command::SetDensity,
            Request::SetLabelType(_) => Command::SetLabelType,
            Request::PrintStart => Command::PrintStart,
            Request::PageStart => Command::PageStart,
            Request::SetPageSize { .. } => Command::SetPageSize,
            Request::PrintEmptyRows { .. } => Command::PrintEmptyRows,
            Request::PrintBitmapRow { .. } => Command::PrintBitmapRow,
            Request::PageEnd => Command::PageEnd,
            Request::PrintEnd => Command::PrintEnd,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match *self {
            Request::Connect
            | Request::Heartbeat
            | Request::PageStart
            | Request::PageEnd
            | Request::PrintEnd => vec![0x01],

            Request::SetDensity(density) => vec![density],
            Request::SetLabelType(ty) => vec![ty as u8],

            // One page.
            Request::PrintStart => vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],

            Request::SetPageSize { width, height } => {
                let [h_hi, h_lo] = height.to_be_bytes();
                let [w_hi, w_lo] = width.to_be_bytes();

                vec![h_hi, h_lo, w_hi, w_lo, 0x00, 0x01]
            }

            Request::PrintEmptyRows { row, count } => {
                let [hi, lo] = row.to_be_bytes();
                vec![hi, lo, count]
            }

            Request::PrintBitmapRow { row, repeat, data } => {
                let [hi, lo] = row.to_be_bytes();

                let mut payload = Vec::with_capacity(BITMAP_ROW_HEADER + data.len());
                payload.extend_from_slice(&[hi, lo, 0x00, 0x00, 0x00, repeat]);

                // The printer wants 1 = black.
                payload.extend(data.iter().map(|byte| !byte));
                payload
            }
        }
    }

    /// The complete byte sequence to put on the wire.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let command = self.command();
        let packet = frame(command.code(), &self.payload())?;

        if command == Command::Connect {
            let mut prefixed = Vec::with_capacity(packet.len() + 1);
            prefixed.push(CONNECT_PREFIX);
            prefixed.extend_from_slice(&packet);

            return Ok(prefixed);
        }

        Ok(packet)
    }
}

/// XOR over command, length and payload.
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(command ^ payload.len() as u8, |acc, byte| acc ^ byte)
}

/// `[0x55 0x55] cmd len payload.. checksum [0xAA 0xAA]`
pub fn frame(command: u8, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::PayloadTooLong(payload.len()));
    }

    let mut packet = Vec::with_capacity(payload.len() + 7);

    packet.extend_from_slice(&HEAD);
    packet.push(command);
    packet.push(payload.len() as u8);
    packet.extend_from_slice(payload);
    packet.push(checksum(command, payload));
    packet.extend_from_slice(&TAIL);

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn density_packet() {
        assert_eq!(
            Request::SetDensity(3).encode().unwrap(),
            vec![0x55, 0x55, 0x21, 0x01, 0x03, 0x23, 0xaa, 0xaa]
        );
    }

    #[test]
    fn connect_is_prefixed() {
        let packet = Request::Connect.encode().unwrap();

        assert_eq!(packet[0], CONNECT_PREFIX);
        assert_eq!(&packet[1..], &[0x55, 0x55, 0xdc, 0x01, 0x01, 0xdc, 0xaa, 0xaa]);
    }

    #[test]
    fn heartbeat_is_not_prefixed() {
        let packet = Request::Heartbeat.encode().unwrap();
        assert_eq!(&packet[..3], &[0x55, 0x55, 0xdc]);
    }

    #[test]
    fn page_size_is_height_first() {
        let payload = Request::SetPageSize {
            width: 400,
            height: 240,
        }
        .payload();

        assert_eq!(payload, vec![0x00, 0xf0, 0x01, 0x90, 0x00, 0x01]);
    }

    #[test]
    fn bitmap_row_is_inverted() {
        let data = [0xff, 0x00, 0xf0];
        let payload = Request::PrintBitmapRow {
            row: 0x0102,
            repeat: 1,
            data: &data,
        }
        .payload();

        assert_eq!(payload, vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0xff, 0x0f]);
    }

    #[test]
    fn checksum_covers_length() {
        let packet = frame(0x85, &[0x00, 0x0a, 0x00, 0x00, 0x00, 0x01, 0x80]).unwrap();
        let len = packet.len();

        assert_eq!(packet[3], 7);
        assert_eq!(packet[len - 3], 0x85 ^ 7 ^ 0x0a ^ 0x01 ^ 0x80);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(matches!(
            frame(0x85, &[0u8; MAX_PAYLOAD + 1]),
            Err(Error::PayloadTooLong(256))
        ));
    }

    #[test]
    fn only_rows_skip_the_ack() {
        assert!(Command::SetPageSize.expects_ack());
        assert!(!Command::PrintEmptyRows.expects_ack());
        assert!(!Command::PrintBitmapRow.expects_ack());
    }
}
