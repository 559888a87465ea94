use crate::error::{Result, SupernodeError};

// Start and end (inclusive) byte index of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: i64,
    pub end: i64,
}

// Parses a Range header such as "bytes=0-1023,-100" against a file of `length` bytes.
pub fn parse_http_range(header: &str, length: i64) -> Result<Vec<ByteRange>> {
    let sets = match header.split_once('=') {
        Some((_, rest)) if !rest.contains('=') => rest,
        Some(_) => {
            return Err(SupernodeError::InvalidValue(format!(
                "invalid range: {}, should be like bytes=0-1023", header
            )))
        },
        None => header,
    };

    let mut ranges = Vec::new();
    for part in sets.split(',') {
        if part.matches('-').count() != 1 {
            return Err(SupernodeError::InvalidValue(format!(
                "invalid range: {}, should be like 0-1023", part
            )));
        }
        let range = if let Some(suffix) = part.strip_prefix('-') {
            // Last n bytes.
            let n = parse_index(suffix, part)?;
            if n > length {
                return Err(SupernodeError::RangeNotSatisfiable(part.to_string()));
            }
            ByteRange { start: length - n, end: length - 1 }
        } else if let Some(prefix) = part.strip_suffix('-') {
            let start = parse_index(prefix, part)?;
            if start > length {
                return Err(SupernodeError::RangeNotSatisfiable(part.to_string()));
            }
            ByteRange { start, end: length - 1 }
        } else {
            let (s, e) = part.split_once('-').unwrap_or((part, ""));
            let start = parse_index(s, part)?;
            if start > length {
                return Err(SupernodeError::RangeNotSatisfiable(part.to_string()));
            }
            let end = parse_index(e, part)?;
            if end > length {
                return Err(SupernodeError::RangeNotSatisfiable(part.to_string()));
            }
            if end < start {
                return Err(SupernodeError::InvalidValue(format!(
                    "range: {}, the start is larger the end", part
                )));
            }
            ByteRange { start, end }
        };
        ranges.push(range);
    }
    Ok(ranges)
}

fn parse_index(s: &str, part: &str) -> Result<i64> {
    match s.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(SupernodeError::InvalidValue(format!("failed to parse range: {}", part))),
    }
}

// Parses a piece range "start-end" into its bounds.
pub fn parse_piece_index(range: &str) -> Result<(i64, i64)> {
    let mut parts = range.split('-');
    let (Some(s), Some(e), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SupernodeError::InvalidValue(format!(
            "range value({}) is illegal which should be like 0-45535", range
        )));
    };
    let start = s.parse::<i64>()
        .map_err(|_| SupernodeError::InvalidValue(format!("range({}) start is not a number", range)))?;
    let end = e.parse::<i64>()
        .map_err(|_| SupernodeError::InvalidValue(format!("range({}) end is not a number", range)))?;
    if end < start {
        return Err(SupernodeError::InvalidValue(format!("range({}) start is larger than end", range)));
    }
    Ok((start, end))
}

// Piece number addressed by a piece range, -1 when the range is malformed.
pub fn piece_num(range: &str) -> i32 {
    let Ok((start, end)) = parse_piece_index(range) else {
        return -1;
    };
    end.checked_sub(start)
        .and_then(|d| d.checked_add(1))
        .and_then(|size| i32::try_from(start / size).ok())
        .unwrap_or(-1)
}

// Byte range of piece n in the framed cdn file.
pub fn piece_range(piece_num: i32, piece_size: i32) -> String {
    let start = piece_num as i64 * piece_size as i64;
    format!("{}-{}", start, start + piece_size as i64 - 1)
}

// Range of the origin file still to fetch when resuming from `start_piece`.
pub fn break_range(start_piece: i32, piece_cont_size: i32, length: i64) -> Result<String> {
    if start_piece <= 0 {
        return Err(SupernodeError::InvalidValue(format!("start piece is illegal for value: {}", start_piece)));
    }
    if length <= 0 {
        return Err(SupernodeError::InvalidValue(format!("range length is illegal for value: {}", length)));
    }
    let start = start_piece as i64 * piece_cont_size as i64;
    let end = length - 1;
    if start > end {
        return Err(SupernodeError::InvalidValue(format!("start: {} is larger than end: {}", start, end)));
    }
    Ok(format!("{}-{}", start, end))
}
