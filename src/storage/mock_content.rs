// src/storage/mock_content.rs
//! In-memory [`ContentStore`] used by service and router tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

use super::ipfs_client::{ContentStore, IpfsError, PinnedContent, RetrievedContent};

/// CIDs are derived from a counter, so identical uploads still get distinct ids.
#[derive(Default)]
pub struct MockContentStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    counter: Mutex<u64>,
}

impl MockContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn upload(&self, _file_name: &str, data: Vec<u8>) -> Result<PinnedContent, IpfsError> {
        let cid = {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            format!("QmMock{:040}", *counter)
        };
        let size = data.len() as u64;
        self.blobs.lock().unwrap().insert(cid.clone(), Bytes::from(data));
        Ok(PinnedContent {
            url: format!("https://gateway.pinata.cloud/ipfs/{}", cid),
            cid,
            size,
        })
    }

    async fn retrieve(&self, cid: &str) -> Result<RetrievedContent, IpfsError> {
        match self.blobs.lock().unwrap().get(cid) {
            Some(data) => Ok(RetrievedContent {
                data: data.clone(),
                content_type: None,
                source: format!("mock://{}", cid),
            }),
            None => Err(IpfsError::AllGatewaysFailed {
                gateway: format!("mock://{}", cid),
                reason: "HTTP status client error (404 Not Found)".into(),
            }),
        }
    }
}
