use crate::error::LoadError;
use crate::memory::MEMORY_SIZE;

const COMMENT: char = '#';

/// Parse LS-8 program source into bytes.
///
/// One byte per line, written in binary. Anything after `#` is ignored,
/// as are blank lines.
pub fn parse_program(src: &str) -> Result<Vec<u8>, LoadError> {
    let mut bytes = Vec::new();
    for (i, line) in src.lines().enumerate() {
        let code = match line.split_once(COMMENT) {
            Some((code, _comment)) => code,
            None => line,
        }
        .trim();
        if code.is_empty() {
            continue;
        }
        bytes.push(parse_byte(code).ok_or_else(|| LoadError::InvalidInstructionEncoding {
            line: i + 1,
            text: code.to_string(),
        })?);
    }
    check_size(&bytes)?;
    Ok(bytes)
}

pub(crate) fn check_size(bytes: &[u8]) -> Result<(), LoadError> {
    if bytes.len() > MEMORY_SIZE {
        return Err(LoadError::ProgramTooLarge { len: bytes.len() });
    }
    Ok(())
}

// Avoid `from_str_radix` accepting a leading `+`
fn parse_byte(code: &str) -> Option<u8> {
    if code.len() > 8 || !code.chars().all(|ch| ch == '0' || ch == '1') {
        return None;
    }
    u8::from_str_radix(code, 2).ok()
}
