//! Off-chain metadata documents and their graceful degradation.

use crate::constants::{IPFS_CID_REGEX, IPFS_URI_REGEX};
use crate::errors::{ClientError, Result};
use crate::transport::IpfsService;
use cid::Cid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMetadata {
    pub title: String,
    pub summary: String,
    pub description: String,
    #[serde(default)]
    pub resources: Vec<MetadataResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<ProposalMedia>,
}

/// Subset of the metadata shown in proposal lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalMetadataSummary {
    pub title: String,
    pub summary: String,
}

impl From<&ProposalMetadata> for ProposalMetadataSummary {
    fn from(metadata: &ProposalMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            summary: metadata.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoMetadata {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub links: Vec<MetadataResource>,
}

/// Placeholder documents used when the real one cannot be shown
pub trait MetadataFallback: Sized {
    /// The record references no metadata at all
    fn empty() -> Self;
    /// The reference is not a supported content link
    fn unsupported_link() -> Self;
    /// The content could not be fetched or parsed
    fn unavailable() -> Self;
}

impl ProposalMetadata {
    fn placeholder(title: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            summary: text.to_string(),
            description: text.to_string(),
            resources: vec![],
            media: None,
        }
    }
}

impl MetadataFallback for ProposalMetadata {
    fn empty() -> Self {
        Self::placeholder(
            "(the proposal has no metadata)",
            "(the current proposal does not have any content defined)",
        )
    }

    fn unsupported_link() -> Self {
        Self::placeholder(
            "(unsupported metadata link)",
            "(the link to the metadata is not supported)",
        )
    }

    fn unavailable() -> Self {
        Self::placeholder(
            "(unavailable metadata)",
            "(the proposal metadata is not available)",
        )
    }
}

impl MetadataFallback for DaoMetadata {
    fn empty() -> Self {
        Self {
            name: "(the DAO has no metadata)".to_string(),
            description: "(the DAO does not have any content defined)".to_string(),
            avatar: None,
            links: vec![],
        }
    }

    fn unsupported_link() -> Self {
        Self {
            name: "(unsupported metadata link)".to_string(),
            description: "(the link to the metadata is not supported)".to_string(),
            avatar: None,
            links: vec![],
        }
    }

    fn unavailable() -> Self {
        Self {
            name: "(unavailable metadata)".to_string(),
            description: "(the DAO metadata is not available)".to_string(),
            avatar: None,
            links: vec![],
        }
    }
}

/// Extract the CID out of `ipfs://{cid}` or a bare CID
pub fn resolve_ipfs_cid(uri: &str) -> Result<String> {
    let cid = if IPFS_URI_REGEX.is_match(uri) {
        &uri["ipfs://".len()..]
    } else if IPFS_CID_REGEX.is_match(uri) {
        uri
    } else {
        return Err(ClientError::InvalidCid(uri.to_string()));
    };

    Cid::try_from(cid).map_err(|e| ClientError::InvalidCid(format!("{}: {}", cid, e)))?;
    Ok(cid.to_string())
}

/// Serialize, add and pin a document, returning `ipfs://{cid}`
pub async fn pin_json<T: Serialize + Sync>(ipfs: &dyn IpfsService, document: &T) -> Result<String> {
    let content =
        serde_json::to_string(document).map_err(|e| ClientError::IpfsPin(e.to_string()))?;
    let cid = ipfs
        .add(&content)
        .await
        .map_err(|e| ClientError::IpfsPin(e.to_string()))?;
    ipfs.pin(&cid)
        .await
        .map_err(|e| ClientError::IpfsPin(e.to_string()))?;
    debug!("Pinned metadata as {}", cid);
    Ok(format!("ipfs://{}", cid))
}

/// Fetch and parse a document behind a content link
pub async fn fetch_json<T: DeserializeOwned>(ipfs: &dyn IpfsService, uri: &str) -> Result<T> {
    let cid = resolve_ipfs_cid(uri)?;
    let content = ipfs.fetch_string(&cid).await?;
    serde_json::from_str(&content).map_err(|e| ClientError::InvalidMetadata(e.to_string()))
}

/// Load the document referenced by an indexed record, never failing.
///
/// A missing reference yields the empty placeholder, an unsupported link the
/// unsupported placeholder, and any fetch or parse failure (including the
/// optional timeout) the unavailable placeholder.
pub async fn resolve_metadata<T>(
    ipfs: &dyn IpfsService,
    uri: Option<&str>,
    timeout: Option<Duration>,
) -> T
where
    T: DeserializeOwned + MetadataFallback,
{
    let uri = match uri {
        Some(uri) if !uri.is_empty() => uri,
        _ => return T::empty(),
    };

    let fetched = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fetch_json::<T>(ipfs, uri)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(limit)),
        },
        None => fetch_json::<T>(ipfs, uri).await,
    };

    match fetched {
        Ok(metadata) => metadata,
        Err(ClientError::InvalidCid(reason)) => {
            warn!("Unsupported metadata link {}: {}", uri, reason);
            T::unsupported_link()
        }
        Err(e) => {
            warn!("Metadata at {} is unavailable: {}", uri, e);
            T::unavailable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockIpfsService;

    const CID: &str = "QmXhJ7MPBFhn6HHQYpLDKWzj1uhxB5vYcH6RjYv9TSFTSa";

    fn sample() -> ProposalMetadata {
        ProposalMetadata {
            title: "Fund the grants program".to_string(),
            summary: "Send 10 ETH".to_string(),
            description: "Long description".to_string(),
            resources: vec![MetadataResource {
                name: "Forum".to_string(),
                url: "https://forum.example.org".to_string(),
            }],
            media: None,
        }
    }

    #[test]
    fn test_resolve_ipfs_cid() {
        assert_eq!(resolve_ipfs_cid(&format!("ipfs://{}", CID)).unwrap(), CID);
        assert_eq!(resolve_ipfs_cid(CID).unwrap(), CID);
        assert!(matches!(
            resolve_ipfs_cid("https://example.com/metadata.json"),
            Err(ClientError::InvalidCid(_))
        ));
    }

    #[test]
    fn test_resolve_ipfs_cid_checks_multihash() {
        // matches the textual pattern but is not a valid base58 multihash
        let fake = format!("Qm{}", "1".repeat(44));
        assert!(matches!(resolve_ipfs_cid(&fake), Err(ClientError::InvalidCid(_))));
    }

    #[test]
    fn test_sentinels() {
        let unsupported = ProposalMetadata::unsupported_link();
        assert_eq!(unsupported.title, "(unsupported metadata link)");
        assert!(unsupported.resources.is_empty());
        assert_eq!(ProposalMetadata::empty().title, "(the proposal has no metadata)");
        assert_eq!(ProposalMetadata::unavailable().summary, "(the proposal metadata is not available)");
    }

    #[tokio::test]
    async fn test_pin_json_returns_uri() {
        let mut ipfs = MockIpfsService::new();
        ipfs.expect_add().returning(|_| Ok(CID.to_string()));
        ipfs.expect_pin().withf(|cid| cid == CID).returning(|_| Ok(()));

        let uri = pin_json(&ipfs, &sample()).await.unwrap();
        assert_eq!(uri, format!("ipfs://{}", CID));
    }

    #[tokio::test]
    async fn test_pin_json_wraps_failures() {
        let mut ipfs = MockIpfsService::new();
        ipfs.expect_add()
            .returning(|_| Err(ClientError::NoEndpoints("IPFS")));

        let err = pin_json(&ipfs, &sample()).await.unwrap_err();
        assert!(matches!(err, ClientError::IpfsPin(_)));
    }

    #[tokio::test]
    async fn test_resolve_metadata_success() {
        let mut ipfs = MockIpfsService::new();
        let body = serde_json::to_string(&sample()).unwrap();
        ipfs.expect_fetch_string()
            .returning(move |_| Ok(body.clone()));

        let uri = format!("ipfs://{}", CID);
        let metadata: ProposalMetadata = resolve_metadata(&ipfs, Some(&uri), None).await;
        assert_eq!(metadata, sample());
    }

    #[tokio::test]
    async fn test_resolve_metadata_degrades() {
        let ipfs = MockIpfsService::new();
        let empty: ProposalMetadata = resolve_metadata(&ipfs, None, None).await;
        assert_eq!(empty, ProposalMetadata::empty());

        let unsupported: ProposalMetadata =
            resolve_metadata(&ipfs, Some("https://example.com/x.json"), None).await;
        assert_eq!(unsupported, ProposalMetadata::unsupported_link());

        let mut failing = MockIpfsService::new();
        failing
            .expect_fetch_string()
            .returning(|_| Ok("not json".to_string()));
        let unavailable: ProposalMetadata = resolve_metadata(&failing, Some(CID), None).await;
        assert_eq!(unavailable, ProposalMetadata::unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_metadata_timeout() {
        struct SlowIpfs;

        #[async_trait::async_trait]
        impl IpfsService for SlowIpfs {
            async fn add(&self, _content: &str) -> Result<String> {
                unreachable!()
            }
            async fn pin(&self, _cid: &str) -> Result<()> {
                unreachable!()
            }
            async fn fetch_string(&self, _cid: &str) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("{}".to_string())
            }
            async fn ensure_online(&self) -> Result<()> {
                Ok(())
            }
        }

        let metadata: ProposalMetadata =
            resolve_metadata(&SlowIpfs, Some(CID), Some(Duration::from_secs(7))).await;
        assert_eq!(metadata, ProposalMetadata::unavailable());
    }
}
