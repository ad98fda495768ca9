//! `ergopay:` URI handling
//!
//! Static requests carry the reduced transaction inline
//! (`ergopay:<base64url>`); dynamic ones point at a dApp endpoint
//! (`ergopay://host/path`) that answers with an [`ErgoPayResponse`] JSON.
//!
//! [`ErgoPayResponse`]: crate::ErgoPayResponse

use std::net::IpAddr;

use cold_signing::decode_base64;

use crate::error::ErgoPayError;
use crate::types::ErgoPaySigningRequest;

const SCHEME: &str = "ergopay:";
const ADDRESS_PLACEHOLDER: &str = "#P2PK_ADDRESS#";
const ADDRESS_PLACEHOLDER_ENCODED: &str = "%23P2PK_ADDRESS%23";

fn strip_scheme(uri: &str) -> Option<&str> {
    let prefix = uri.get(..SCHEME.len())?;
    prefix
        .eq_ignore_ascii_case(SCHEME)
        .then(|| &uri[SCHEME.len()..])
}

/// Case-insensitive check for the `ergopay:` scheme
pub fn is_ergopay_request(uri: &str) -> bool {
    strip_scheme(uri.trim()).is_some()
}

/// Whether the transaction is embedded in the URI itself
pub fn is_static_request(uri: &str) -> bool {
    strip_scheme(uri.trim()).is_some_and(|rest| !rest.starts_with("//"))
}

/// Whether the dApp expects the wallet address substituted into the URL
pub fn needs_address(uri: &str) -> bool {
    !is_static_request(uri)
        && (uri.contains(ADDRESS_PLACEHOLDER) || uri.contains(ADDRESS_PLACEHOLDER_ENCODED))
}

pub fn parse_static_request(uri: &str) -> Result<ErgoPaySigningRequest, ErgoPayError> {
    let payload = strip_scheme(uri.trim())
        .filter(|rest| !rest.starts_with("//"))
        .ok_or_else(|| ErgoPayError::NotErgoPay(uri.to_string()))?;
    let reduced_tx =
        decode_base64("reducedTx", payload).map_err(|e| ErgoPayError::InvalidPayload(e.to_string()))?;
    if reduced_tx.is_empty() {
        return Err(ErgoPayError::InvalidPayload("empty transaction".to_string()));
    }
    Ok(ErgoPaySigningRequest::from_reduced_tx(reduced_tx))
}

/// Host part of `//host[:port]/...`, brackets of IPv6 literals removed
fn host_of(rest: &str) -> &str {
    let authority = rest
        .trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    if let Some(v6) = authority.strip_prefix('[') {
        return v6.split(']').next().unwrap_or_default();
    }
    authority.split(':').next().unwrap_or_default()
}

/// Plain http is only used for development hosts
pub fn is_local_or_ip(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.to_ascii_lowercase().ends_with(".local")
        || host.parse::<IpAddr>().is_ok()
}

/// HTTP(S) URL to fetch for a dynamic request, with the address substituted
pub fn fetch_url(uri: &str, address: Option<&str>) -> Result<String, ErgoPayError> {
    let uri = uri.trim();
    let rest = strip_scheme(uri)
        .filter(|rest| rest.starts_with("//"))
        .ok_or_else(|| ErgoPayError::NotErgoPay(uri.to_string()))?;

    let host = host_of(rest);
    if host.is_empty() {
        return Err(ErgoPayError::NotErgoPay(uri.to_string()));
    }

    let mut url = format!(
        "{}:{}",
        if is_local_or_ip(host) { "http" } else { "https" },
        rest
    );

    if needs_address(uri) {
        let address = address.ok_or(ErgoPayError::AddressRequired)?;
        url = url
            .replace(ADDRESS_PLACEHOLDER, address)
            .replace(ADDRESS_PLACEHOLDER_ENCODED, address);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert!(is_ergopay_request("ergopay://dapp.example/tx"));
        assert!(is_ergopay_request("ErgoPay:AAAA"));
        assert!(!is_ergopay_request("ergo:9abc"));
        assert!(!is_ergopay_request("ergopa"));

        assert!(is_static_request("ERGOPAY:-_8="));
        assert!(!is_static_request("ergopay://dapp.example/tx"));
    }

    #[test]
    fn test_static_request() {
        let request = parse_static_request("ergopay:-_8=").unwrap();
        assert_eq!(request.reduced_tx, Some(vec![0xfb, 0xff]));
        assert!(request.reply_to_url.is_none());

        assert!(matches!(
            parse_static_request("ergopay:!!"),
            Err(ErgoPayError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_static_request("ergopay:"),
            Err(ErgoPayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_fetch_url_scheme_by_host() {
        assert_eq!(
            fetch_url("ergopay://dapp.example/tx/1", None).unwrap(),
            "https://dapp.example/tx/1"
        );
        assert_eq!(
            fetch_url("ergopay://localhost:8080/tx", None).unwrap(),
            "http://localhost:8080/tx"
        );
        assert_eq!(
            fetch_url("ergopay://192.168.1.20:3000/tx", None).unwrap(),
            "http://192.168.1.20:3000/tx"
        );
        assert_eq!(
            fetch_url("ergopay://[::1]:3000/tx", None).unwrap(),
            "http://[::1]:3000/tx"
        );
        assert_eq!(
            fetch_url("ergopay://raspberry.local/tx", None).unwrap(),
            "http://raspberry.local/tx"
        );
        assert!(fetch_url("ergopay:AAAA", None).is_err());
    }

    #[test]
    fn test_address_placeholder() {
        let uri = "ergopay://dapp.example/connect/#P2PK_ADDRESS#";
        assert!(needs_address(uri));
        assert!(matches!(
            fetch_url(uri, None),
            Err(ErgoPayError::AddressRequired)
        ));
        assert_eq!(
            fetch_url(uri, Some("9abc")).unwrap(),
            "https://dapp.example/connect/9abc"
        );

        let encoded = "ergopay://dapp.example/tx?addr=%23P2PK_ADDRESS%23";
        assert_eq!(
            fetch_url(encoded, Some("9abc")).unwrap(),
            "https://dapp.example/tx?addr=9abc"
        );
        assert!(!needs_address("ergopay://dapp.example/tx"));
    }
}
