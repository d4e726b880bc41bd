use bytes::{Bytes, BytesMut};

/// Line terminator for every command and response.
pub const DELIMITER: &[u8] = b"\r\n";

/// First line sent on every new connection.
pub const GREETING: &[u8] = b"You are connected.";

/// POP response when nothing is queued.
pub const EMPTY_QUEUE: &[u8] = b"The message queue is empty now.";

const POP: &[u8] = b"POP";
const PUSH: &[u8] = b"PUSH";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pop,
    /// Payload to enqueue, possibly empty.
    Push(Bytes),
    /// Command token that is neither POP nor PUSH, kept for logging.
    Unknown(Bytes),
}

/// Splits the first CRLF-terminated line off the front of `buffer`.
///
/// The returned line still ends with the delimiter. Bytes after it stay in
/// `buffer` for the next call. Returns `None` until a full line has arrived.
///
/// `scanned` counts the bytes already searched without finding a delimiter,
/// so repeated calls on a growing buffer only look at new bytes. Start it at
/// zero; it is reset whenever a line is returned.
pub fn take_line(buffer: &mut BytesMut, scanned: &mut usize) -> Option<BytesMut> {
    // back up one byte so a CR at the end of the last read can pair with an LF
    let start = scanned.saturating_sub(DELIMITER.len() - 1).min(buffer.len());
    match buffer[start..]
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
    {
        Some(offset) => {
            *scanned = 0;
            Some(buffer.split_to(start + offset + DELIMITER.len()))
        }
        None => {
            *scanned = buffer.len();
            None
        }
    }
}

/// Interprets one command line.
///
/// The command token is everything before the first space, compared without
/// regard to ASCII case once trailing CR/LF bytes are stripped. For PUSH the
/// payload keeps its original case and interior whitespace; only the spaces
/// separating it from the token and the trailing CR/LF bytes are removed.
pub fn parse_command(line: Bytes) -> Command {
    let token_end = line
        .iter()
        .position(|&byte| byte == b' ')
        .unwrap_or(line.len());
    let token = trim_line_end(&line[..token_end]);

    if token.eq_ignore_ascii_case(POP) {
        return Command::Pop;
    }

    if token.eq_ignore_ascii_case(PUSH) {
        let rest = &line[PUSH.len()..];
        let leading_spaces = rest.iter().take_while(|&&byte| byte == b' ').count();
        let payload = trim_line_end(&rest[leading_spaces..]);
        let start = PUSH.len() + leading_spaces;
        return Command::Push(line.slice(start..start + payload.len()));
    }

    Command::Unknown(line.slice(..token.len()))
}

/// Builds a response line: `payload` followed by the delimiter.
pub fn encode_line(payload: &[u8], out: &mut BytesMut) {
    out.clear();
    out.reserve(payload.len() + DELIMITER.len());
    out.extend_from_slice(payload);
    out.extend_from_slice(DELIMITER);
}

fn trim_line_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&byte| byte != b'\r' && byte != b'\n')
        .map_or(0, |last| last + 1);
    &bytes[..end]
}
