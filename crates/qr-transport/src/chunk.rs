//! EIP-19 QR chunk framing
//!
//! A payload that fits one code is framed as `TAG-<data>`. Larger payloads are
//! split into pages framed as `TAG/<n>/<count>-<data>`, where `n` is 1-based
//! on the wire. The header never contains `-`, so everything after the first
//! `-` is payload, whatever it contains.

use std::fmt;

use wallet_core::CHUNK_HEADER_RESERVE;

const DATA_DELIMITER: char = '-';
const HEADER_DELIMITER: char = '/';

/// Most pages one message may declare. A block-sized transaction at the
/// low-res preset stays below 2000 pages.
pub const MAX_PAGE_COUNT: usize = 4096;

/// Protocol tag distinguishing the two directions of a cold signing exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkTag {
    /// Unsigned (reduced) transaction going to the cold device
    ColdSigningRequest,
    /// Signed transaction coming back from the cold device
    ColdSignedTx,
}

impl ChunkTag {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ColdSigningRequest => "CSR",
            Self::ColdSignedTx => "CSTX",
        }
    }

    /// Tag of a raw scanned string, if it carries one of ours
    pub fn detect(raw: &str) -> Option<Self> {
        [Self::ColdSigningRequest, Self::ColdSignedTx]
            .into_iter()
            .find(|tag| decode(raw, *tag).is_some())
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One decoded page of a chunked payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrChunk {
    pub tag: ChunkTag,
    /// 0-based position of this page
    pub page_index: usize,
    pub page_count: usize,
    pub fragment: String,
}

impl QrChunk {
    /// Serialize back into the scanned string form
    pub fn to_wire(&self) -> String {
        if self.page_count == 1 {
            format!("{}{}{}", self.tag.prefix(), DATA_DELIMITER, self.fragment)
        } else {
            format!(
                "{prefix}{h}{n}{h}{count}{d}{data}",
                prefix = self.tag.prefix(),
                h = HEADER_DELIMITER,
                n = self.page_index + 1,
                count = self.page_count,
                d = DATA_DELIMITER,
                data = self.fragment,
            )
        }
    }
}

/// Payload characters that fit into one chunk of `max_chunk_size`
pub fn chunk_capacity(max_chunk_size: usize) -> usize {
    max_chunk_size.saturating_sub(CHUNK_HEADER_RESERVE).max(1)
}

/// Split `payload` into framed chunks no longer than `max_chunk_size`.
///
/// An empty payload still yields one chunk so the receiver sees a message.
pub fn encode(tag: ChunkTag, payload: &str, max_chunk_size: usize) -> Vec<String> {
    let capacity = chunk_capacity(max_chunk_size);
    let chars: Vec<char> = payload.chars().collect();

    if chars.len() <= capacity {
        return vec![QrChunk {
            tag,
            page_index: 0,
            page_count: 1,
            fragment: payload.to_string(),
        }
        .to_wire()];
    }

    let pages: Vec<&[char]> = chars.chunks(capacity).collect();
    let page_count = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(page_index, fragment)| {
            QrChunk {
                tag,
                page_index,
                page_count,
                fragment: fragment.iter().collect(),
            }
            .to_wire()
        })
        .collect()
}

/// Decode a scanned string, expecting `tag`.
///
/// Returns `None` for anything that is not a well-formed chunk of that tag,
/// so unrelated QR codes can be ignored silently.
pub fn decode(raw: &str, tag: ChunkTag) -> Option<QrChunk> {
    let (header, data) = raw.split_once(DATA_DELIMITER)?;
    let rest = header.strip_prefix(tag.prefix())?;

    if rest.is_empty() {
        return Some(QrChunk {
            tag,
            page_index: 0,
            page_count: 1,
            fragment: data.to_string(),
        });
    }

    let (page, count) = rest.strip_prefix(HEADER_DELIMITER)?.split_once(HEADER_DELIMITER)?;
    let page: usize = page.parse().ok()?;
    let page_count: usize = count.parse().ok()?;
    if page == 0 || page > page_count || page_count > MAX_PAGE_COUNT {
        return None;
    }

    Some(QrChunk {
        tag,
        page_index: page - 1,
        page_count,
        fragment: data.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(chunks: &[String], tag: ChunkTag) -> String {
        let mut decoded: Vec<QrChunk> = chunks.iter().map(|c| decode(c, tag).unwrap()).collect();
        decoded.sort_by_key(|c| c.page_index);
        decoded.into_iter().map(|c| c.fragment).collect()
    }

    #[test]
    fn test_single_chunk() {
        let chunks = encode(ChunkTag::ColdSigningRequest, "{\"reducedTx\":\"AA==\"}", 2900);
        assert_eq!(chunks, vec!["CSR-{\"reducedTx\":\"AA==\"}".to_string()]);

        let chunk = decode(&chunks[0], ChunkTag::ColdSigningRequest).unwrap();
        assert_eq!(chunk.page_index, 0);
        assert_eq!(chunk.page_count, 1);
    }

    #[test]
    fn test_three_pages_of_hundred_twenty() {
        let payload: String = (0..300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = encode(ChunkTag::ColdSignedTx, &payload, 120 + CHUNK_HEADER_RESERVE);
        assert_eq!(chunks.len(), 3);

        for (i, raw) in chunks.iter().enumerate() {
            let chunk = decode(raw, ChunkTag::ColdSignedTx).unwrap();
            assert_eq!(chunk.page_index, i);
            assert_eq!(chunk.page_count, 3);
            assert!(raw.len() <= 120 + CHUNK_HEADER_RESERVE);
        }
        assert!(chunks[0].starts_with("CSTX/1/3-"));
        assert_eq!(join(&chunks, ChunkTag::ColdSignedTx), payload);
    }

    #[test]
    fn test_round_trip_sizes() {
        for size in [0usize, 1, 19, 20, 21, 79, 80, 81, 250, 1000] {
            let payload: String = "x-y/".chars().cycle().take(size).collect();
            for max in [21usize, 30, 100, 2900] {
                let chunks = encode(ChunkTag::ColdSigningRequest, &payload, max);
                assert_eq!(
                    join(&chunks, ChunkTag::ColdSigningRequest),
                    payload,
                    "size {} max {}",
                    size,
                    max
                );
            }
        }
    }

    #[test]
    fn test_multibyte_payload_split_on_char_boundaries() {
        let payload = "äöü€".repeat(40);
        let chunks = encode(ChunkTag::ColdSigningRequest, &payload, 50);
        assert!(chunks.len() > 1);
        assert_eq!(join(&chunks, ChunkTag::ColdSigningRequest), payload);
    }

    #[test]
    fn test_foreign_tags_rejected() {
        let request = encode(ChunkTag::ColdSigningRequest, "data", 2900);
        assert!(decode(&request[0], ChunkTag::ColdSignedTx).is_none());

        let signed = encode(ChunkTag::ColdSignedTx, "data", 2900);
        assert!(decode(&signed[0], ChunkTag::ColdSigningRequest).is_none());

        assert!(decode("CSRX-data", ChunkTag::ColdSigningRequest).is_none());
        assert!(decode("https://ergoplatform.org", ChunkTag::ColdSigningRequest).is_none());
        assert!(decode("ergopay:AAAA", ChunkTag::ColdSigningRequest).is_none());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let tag = ChunkTag::ColdSigningRequest;
        assert!(decode("CSR/0/2-data", tag).is_none());
        assert!(decode("CSR/3/2-data", tag).is_none());
        assert!(decode("CSR/a/2-data", tag).is_none());
        assert!(decode("CSR/1-data", tag).is_none());
        assert!(decode("CSR/1/0-data", tag).is_none());
        assert!(decode("CSR", tag).is_none());
        assert!(decode("CSR/1/18446744073709551615-x", tag).is_none());
        assert!(decode(&format!("CSR/1/{}-x", MAX_PAGE_COUNT + 1), tag).is_none());
        assert!(decode(&format!("CSR/1/{}-x", MAX_PAGE_COUNT), tag).is_some());
    }

    #[test]
    fn test_detect_tag() {
        assert_eq!(ChunkTag::detect("CSR-x"), Some(ChunkTag::ColdSigningRequest));
        assert_eq!(ChunkTag::detect("CSTX/1/2-x"), Some(ChunkTag::ColdSignedTx));
        assert_eq!(ChunkTag::detect("hello"), None);
    }
}
