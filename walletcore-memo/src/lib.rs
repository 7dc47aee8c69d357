//! Memo chunking.
//!
//! A single shielded output carries at most 512 bytes of memo. Longer text is split
//! into consecutively numbered sub-sends, each memo prefixed with `(i/n)`. The prefix
//! is budgeted at 7 bytes (`(99/99)`), leaving 505 bytes of text per chunk. Only the
//! first sub-send carries the payment amount; the rest send zero.
#![forbid(unsafe_code)]

/// The memo field size of a single shielded output.
pub const MEMO_SIZE: usize = 512;
/// Bytes reserved for the `(i/n)` prefix.
pub const CHUNK_PREFIX_BUDGET: usize = 7;
/// Text bytes carried by each chunk.
pub const CHUNK_TEXT_SIZE: usize = MEMO_SIZE - CHUNK_PREFIX_BUDGET;
/// More chunks would not fit the prefix budget.
pub const MAX_CHUNKS: usize = 99;

/// Errors from splitting a memo.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoChunkError {
    /// The memo is longer than `MAX_CHUNKS` chunks.
    #[error("memo of {len} bytes needs {chunks} chunks, at most {MAX_CHUNKS} are supported")]
    TooManyChunks {
        /// memo length in bytes
        len: usize,
        /// chunks it would need
        chunks: usize,
    },
}

/// One recipient entry after memo chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedRecipient {
    /// recipient address, unchanged
    pub address: String,
    /// zatoshis; only the first chunk carries the amount
    pub amount: u64,
    /// this chunk's memo
    pub memo: String,
}

/// Splits `memo` into prefixed chunks. Memos that fit a single output are returned
/// unchanged, without a prefix.
pub fn split_memo(memo: &str) -> Result<Vec<String>, MemoChunkError> {
    if memo.len() <= MEMO_SIZE {
        return Ok(vec![memo.to_string()]);
    }

    let pieces = split_at_char_boundaries(memo, CHUNK_TEXT_SIZE);
    let total = pieces.len();
    if total > MAX_CHUNKS {
        return Err(MemoChunkError::TooManyChunks {
            len: memo.len(),
            chunks: total,
        });
    }

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| format!("({}/{}){}", i + 1, total, piece))
        .collect())
}

/// Expands one recipient into as many sub-sends as its memo needs.
pub fn chunk_recipient(
    address: &str,
    amount: u64,
    memo: &str,
) -> Result<Vec<ChunkedRecipient>, MemoChunkError> {
    Ok(split_memo(memo)?
        .into_iter()
        .enumerate()
        .map(|(i, memo)| ChunkedRecipient {
            address: address.to_string(),
            amount: if i == 0 { amount } else { 0 },
            memo,
        })
        .collect())
}

/// Parses an `(i/n)` prefix, returning `(i, n, text)`.
pub fn parse_chunk(memo: &str) -> Option<(usize, usize, &str)> {
    let rest = memo.strip_prefix('(')?;
    let close = rest.find(')')?;
    let (numbers, text) = (&rest[..close], &rest[close + 1..]);
    let (index, total) = numbers.split_once('/')?;
    let index: usize = index.parse().ok()?;
    let total: usize = total.parse().ok()?;
    if index == 0 || index > total || total > MAX_CHUNKS {
        return None;
    }
    Some((index, total, text))
}

/// Reassembles a complete set of chunks, in any order, into the original text.
///
/// Returns `None` unless every memo is a chunk of the same set and each index
/// `1..=n` appears exactly once.
pub fn reassemble<S: AsRef<str>>(memos: &[S]) -> Option<String> {
    let mut chunks = memos
        .iter()
        .map(|memo| parse_chunk(memo.as_ref()))
        .collect::<Option<Vec<_>>>()?;
    let total = chunks.first()?.1;
    if chunks.len() != total || chunks.iter().any(|(_, n, _)| *n != total) {
        return None;
    }
    chunks.sort_by_key(|(i, _, _)| *i);
    if chunks.iter().enumerate().any(|(pos, (i, _, _))| pos + 1 != *i) {
        return None;
    }
    Some(chunks.into_iter().map(|(_, _, text)| text).collect())
}

fn split_at_char_boundaries(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = rest.len().min(max_bytes);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (piece, tail) = rest.split_at(end);
        pieces.push(piece);
        rest = tail;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_memo_is_not_prefixed() {
        let memo = "a".repeat(MEMO_SIZE);
        assert_eq!(split_memo(&memo).unwrap(), vec![memo]);
    }

    #[test]
    fn thousand_byte_memo_reassembles() {
        let memo: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_memo(&memo).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("(1/2)"));
        assert!(chunks[1].starts_with("(2/2)"));
        assert!(chunks.iter().all(|c| c.len() <= MEMO_SIZE));

        let reversed: Vec<&String> = chunks.iter().rev().collect();
        assert_eq!(reassemble(&reversed).unwrap().as_bytes(), memo.as_bytes());
    }

    #[test]
    fn only_first_chunk_carries_amount() {
        let memo = "x".repeat(1200);
        let sends = chunk_recipient("u1destination", 100_000, &memo).unwrap();

        assert_eq!(sends.len(), 3);
        assert_eq!(sends[0].amount, 100_000);
        assert!(sends[1..].iter().all(|s| s.amount == 0));
        assert!(sends.iter().all(|s| s.address == "u1destination"));
    }

    #[test]
    fn multibyte_characters_are_not_split() {
        let memo = "é".repeat(400);
        let chunks = split_memo(&memo).unwrap();
        assert!(chunks.iter().all(|c| c.len() <= MEMO_SIZE));
        assert_eq!(reassemble(&chunks).unwrap(), memo);
    }

    #[test]
    fn incomplete_set_does_not_reassemble() {
        let chunks = split_memo(&"z".repeat(1500)).unwrap();
        assert_eq!(reassemble(&chunks[..2]), None);
        assert_eq!(reassemble(&["plain memo"]), None);
    }

    #[test]
    fn too_many_chunks() {
        let memo = "y".repeat(CHUNK_TEXT_SIZE * MAX_CHUNKS + 1);
        assert_eq!(
            split_memo(&memo),
            Err(MemoChunkError::TooManyChunks {
                len: memo.len(),
                chunks: MAX_CHUNKS + 1
            })
        );
    }

    #[test]
    fn parse_rejects_bad_prefixes() {
        assert_eq!(parse_chunk("(0/2)x"), None);
        assert_eq!(parse_chunk("(3/2)x"), None);
        assert_eq!(parse_chunk("1/2)x"), None);
        assert_eq!(parse_chunk("(1/2)x"), Some((1, 2, "x")));
    }

    proptest! {
        #[test]
        fn split_then_reassemble(memo in "\\PC{513,3000}") {
            let chunks = split_memo(&memo).unwrap();
            prop_assert!(chunks.iter().all(|c| c.len() <= MEMO_SIZE));
            prop_assert_eq!(reassemble(&chunks), Some(memo));
        }
    }
}
