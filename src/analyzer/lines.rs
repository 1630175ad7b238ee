/// Longest line we keep. Anything beyond is dropped until the next line break.
pub const MAX_LINE_LEN: usize = 128;

/// Reassembles text lines from arbitrarily chunked serial data.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buffer: String::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Feed a chunk and call `on_line` for every completed, trimmed and non-empty line.
    ///
    /// Carriage returns are skipped. Only printable ASCII is kept.
    pub fn push<F: FnMut(&str)>(&mut self, chunk: &[u8], mut on_line: F) {
        for &byte in chunk {
            match byte {
                b'\n' => {
                    let line = self.buffer.trim();

                    if !line.is_empty() {
                        on_line(line);
                    }

                    self.buffer.clear();
                }

                b'\r' => {}

                0x20..=0x7f if self.buffer.len() < MAX_LINE_LEN => self.buffer.push(byte as char),

                _ => {}
            }
        }
    }

    /// Drop a partially received line (e.g. after the device went away).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn collect(assembler: &mut LineAssembler, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        assembler.push(chunk, |line| lines.push(line.to_string()));
        lines
    }

    #[test]
    fn joins_chunks_across_reads() {
        let mut assembler = LineAssembler::new();

        assert!(collect(&mut assembler, b"He  0.5 %  O").is_empty());
        assert_eq!(collect(&mut assembler, b"2 21.0 %\r\n"), vec!["He  0.5 %  O2 21.0 %"]);
    }

    #[test]
    fn skips_blank_lines_and_control_bytes() {
        let mut assembler = LineAssembler::new();
        let lines = collect(&mut assembler, b"\r\n  \n\x01ab\x00c\xffd\n");

        assert_eq!(lines, vec!["abcd"]);
    }

    #[test]
    fn truncates_overlong_lines() {
        let mut assembler = LineAssembler::new();
        let mut chunk = vec![b'x'; MAX_LINE_LEN + 40];
        chunk.push(b'\n');
        chunk.extend_from_slice(b"next\n");

        let lines = collect(&mut assembler, &chunk);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_LEN);
        assert_eq!(lines[1], "next");
    }

    #[test]
    fn reset_drops_partial_line() {
        let mut assembler = LineAssembler::new();

        collect(&mut assembler, b"He 1.0 % O2 2");
        assembler.reset();

        assert_eq!(collect(&mut assembler, b"tail\n"), vec!["tail"]);
    }
}
