//! This contains test scenarios that a given [BlockService] needs to pass.
//! We use [rstest] and [rstest_reuse] to provide all services we want to test
//! against, and then apply this template to all test functions.

use bytes::Bytes;
use rstest::*;
use rstest_reuse::{self, *};

use super::{Block, BlockService, MemoryBlockService, SimpleFilesystemBlockService};
use crate::fixtures::{HELLOWORLD_BLOCK, RAW_BLOCK_A};
use crate::Error;

/// Returns a simplefs block service, along with the [tempfile::TempDir]
/// that needs to be kept alive for the duration of the test.
async fn make_simplefs() -> (Box<dyn BlockService>, tempfile::TempDir) {
    let tmpdir = tempfile::TempDir::new().unwrap();
    let svc = SimpleFilesystemBlockService::new(tmpdir.path().to_path_buf())
        .await
        .unwrap();
    (Box::new(svc), tmpdir)
}

/// This produces a template, which will be applied to all individual test functions.
/// See https://github.com/la10736/rstest/issues/130#issuecomment-968864832
#[template]
#[rstest]
#[case::memory((Box::<MemoryBlockService>::default() as Box<dyn BlockService>, None))]
#[case::simplefs({ let (svc, dir) = make_simplefs().await; (svc, Some(dir)) })]
pub fn block_services(#[case] svc: (Box<dyn BlockService>, Option<tempfile::TempDir>)) {}

/// Using [BlockService::has] on a non-existing block should return false.
#[apply(block_services)]
#[tokio::test]
async fn has_nonexistent_false(svc: (Box<dyn BlockService>, Option<tempfile::TempDir>)) {
    let (block_service, _tmpdir) = svc;

    assert!(!block_service
        .has(HELLOWORLD_BLOCK.cid())
        .await
        .expect("must not fail"));
}

/// Trying to get a non-existing block should return None.
#[apply(block_services)]
#[tokio::test]
async fn not_found_get(svc: (Box<dyn BlockService>, Option<tempfile::TempDir>)) {
    let (block_service, _tmpdir) = svc;

    assert!(block_service
        .get(HELLOWORLD_BLOCK.cid())
        .await
        .expect("must not fail")
        .is_none());
}

/// Put a block, and ensure it can be retrieved again, byte-exact.
#[apply(block_services)]
#[tokio::test]
async fn put_has_get(svc: (Box<dyn BlockService>, Option<tempfile::TempDir>)) {
    let (block_service, _tmpdir) = svc;

    for block in [&*HELLOWORLD_BLOCK, &*RAW_BLOCK_A] {
        let cid = block_service.put(block.clone()).await.expect("must succeed");
        assert_eq!(block.cid(), &cid);

        assert!(block_service.has(&cid).await.expect("must succeed"));
        assert_eq!(
            Some(block),
            block_service
                .get(&cid)
                .await
                .expect("must succeed")
                .as_ref()
        );
    }

    // putting again is a no-op
    block_service
        .put(HELLOWORLD_BLOCK.clone())
        .await
        .expect("must succeed");
}

/// Blocks whose payload doesn't match their CID are rejected.
#[apply(block_services)]
#[tokio::test]
async fn put_reject_mismatch(svc: (Box<dyn BlockService>, Option<tempfile::TempDir>)) {
    let (block_service, _tmpdir) = svc;

    let block = Block::new(*HELLOWORLD_BLOCK.cid(), Bytes::from_static(b"not hello"));
    let err = block_service.put(block).await.expect_err("must fail");
    assert!(matches!(err, Error::InvalidRequest(_)));

    assert!(!block_service
        .has(HELLOWORLD_BLOCK.cid())
        .await
        .expect("must not fail"));
}
