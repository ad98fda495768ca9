use anyhow::{anyhow, bail, Result};
use cold_signing::{
    request_from_collector, response_from_collector, ColdSigningRequest, ColdSigningResponse,
    PayloadError,
};
use qr_transport::{ChunkTag, PageCollector};

#[derive(Debug)]
pub enum Collected {
    Request(ColdSigningRequest),
    Response(ColdSigningResponse),
}

impl Collected {
    pub fn to_json(&self) -> Result<String, PayloadError> {
        match self {
            Self::Request(request) => request.to_json(),
            Self::Response(response) => response.to_json(),
        }
    }
}

/// Feed chunks into a collector until every page is present.
///
/// The protocol tag is taken from the first recognisable line; later lines
/// of another protocol are ignored.
pub fn collect_lines(lines: impl IntoIterator<Item = String>) -> Result<Collected> {
    let mut collector: Option<PageCollector> = None;

    for line in lines {
        if collector.is_none() {
            match ChunkTag::detect(&line) {
                Some(tag) => collector = Some(PageCollector::new(tag)),
                None => {
                    tracing::debug!(line = %line, "Skipping line without chunk tag");
                    continue;
                }
            }
        }
        let Some(collector) = collector.as_mut() else {
            continue;
        };

        if !collector.add_chunk(&line) {
            tracing::debug!(tag = %collector.tag(), "Ignoring chunk");
            continue;
        }
        tracing::debug!(
            added = collector.pages_added(),
            expected = collector.pages_count(),
            "Chunk added"
        );
        if collector.has_all_pages() {
            break;
        }
    }

    let collector = collector.ok_or_else(|| anyhow!("no chunks found in input"))?;
    if !collector.has_all_pages() {
        bail!(
            "input ended before all pages were read, missing pages {:?}",
            collector.missing_pages()
        );
    }

    Ok(match collector.tag() {
        ChunkTag::ColdSigningRequest => Collected::Request(request_from_collector(&collector)?),
        ChunkTag::ColdSignedTx => Collected::Response(response_from_collector(&collector)?),
    })
}

pub fn run() -> Result<()> {
    let collected = collect_lines(super::stdin_lines())?;
    match &collected {
        Collected::Request(request) => tracing::info!(
            bytes = request.reduced_tx.len(),
            inputs = request.inputs.len(),
            "Cold signing request collected"
        ),
        Collected::Response(response) => tracing::info!(
            bytes = response.signed_tx.len(),
            "Signed transaction collected"
        ),
    }
    println!("{}", collected.to_json()?);
    Ok(())
}
