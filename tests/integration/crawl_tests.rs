//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the roll portal and in-memory
//! object stores for the remote buckets, and run the crawl end-to-end.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use roll_harvester::archive::ArchiveManager;
use roll_harvester::captcha::{CaptchaSolver, FixedSolver};
use roll_harvester::catalog::{Jurisdiction, PartInfo, WorkItem};
use roll_harvester::config::{
    CaptchaConfig, Config, ConversionConfig, EndpointConfig, ResponseMarkers, RetryConfig, SessionConfig,
    SourceConfig, StorageConfig,
};
use roll_harvester::crawler::{ApiClient, Coordinator, Fetcher, RetryPolicy};
use roll_harvester::{DataLayout, GroupKey, PartStatus, Tier};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DRAFT: &str = "/printing-publish/generate-published-droll";
const FINAL: &str = "/printing-publish/generate-published-sroll";
const CAPTCHA: &str = "/captcha-service/generateCaptcha/EROLL";

/// Creates a test configuration pointing at the mock portal
fn create_test_config(server: &MockServer, data_dir: &Path, initial_delay_ms: u64) -> Config {
    Config {
        source: SourceConfig {
            portal_url: format!("{}/portal", server.uri()),
            api_base_url: server.uri(),
            user_agent: "TestHarvester/1.0".to_string(),
            timeout_secs: 5,
            endpoints: EndpointConfig::default(),
            markers: ResponseMarkers::default(),
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay_ms,
            max_captcha_attempts: 5,
        },
        session: SessionConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
        },
        storage: StorageConfig {
            data_dir: data_dir.to_string_lossy().into_owned(),
            priority_file: None,
        },
        conversion: ConversionConfig::default(),
        remote: None,
        captcha: CaptchaConfig {
            command: vec!["cat".to_string()],
        },
    }
}

fn solver() -> Arc<dyn CaptchaSolver> {
    Arc::new(FixedSolver("x7k2p".to_string()))
}

fn group_key() -> GroupKey {
    GroupKey::new("S04", 12, "ENG")
}

fn tar_location() -> ObjectPath {
    ObjectPath::from("S04/12/ENG.tar")
}

struct Remote {
    archive: Arc<ArchiveManager>,
    raw: Arc<InMemory>,
    pages: Arc<InMemory>,
}

fn memory_remote(data_dir: &Path) -> Remote {
    let raw = Arc::new(InMemory::new());
    let pages = Arc::new(InMemory::new());
    let archive = ArchiveManager::new(
        DataLayout::new(data_dir),
        Arc::clone(&raw) as Arc<dyn ObjectStore>,
        Arc::clone(&pages) as Arc<dyn ObjectStore>,
        5 * 1024 * 1024,
        2,
    );
    Remote {
        archive: Arc::new(archive),
        raw,
        pages,
    }
}

fn envelope(payload: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "status": "Success", "message": "ok", "payload": payload
    }))
}

fn document(file: Option<&[u8]>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "status": "Success",
        "message": "ok",
        "file": file.map(|f| STANDARD.encode(f)),
    }))
}

fn unpublished() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(serde_json::json!({
        "status": "Failed", "message": "Roll is not published for this AC", "file": null
    }))
}

/// Mounts a catalog of one state with one constituency, one language and three parts
async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/common/states/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"stateCd": "S04", "stateName": "Bihar"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/common/districts/S04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"districtCd": "S0401", "districtValue": "Patna"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/common/constituencies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"stateCd": "S04", "districtCd": "S0401", "asmblyNo": 12, "asmblyName": "North"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/printing-publish/get-ac-languages"))
        .respond_with(envelope(serde_json::json!(["ENG"])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/printing-publish/get-part-list"))
        .respond_with(envelope(serde_json::json!([
            {"acNumber": 12, "partNumber": 1, "partName": "One", "stateCd": "S04", "districtCd": "S0401"},
            {"acNumber": 12, "partNumber": 2, "partName": "Two", "stateCd": "S04", "districtCd": "S0401"},
            {"acNumber": 12, "partNumber": 3, "partName": "Three", "stateCd": "S04", "districtCd": "S0401"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(CAPTCHA))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "Success", "id": "cap-1", "captcha": STANDARD.encode(b"\x89PNG")
        })))
        .mount(server)
        .await;
}

/// Parts 1 and 2 get `payload`, every later request gets a null file
async fn mount_draft_documents(server: &MockServer, payload: &[u8]) {
    Mock::given(method("POST"))
        .and(path(DRAFT))
        .respond_with(document(Some(payload)))
        .up_to_n_times(2)
        .expect(2)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAFT))
        .respond_with(document(None))
        .expect(1)
        .mount(server)
        .await;
}

/// A PDF with one 2x2 gray image per page
fn scan_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..pages {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 85, 170, 255],
        ));
        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", image_id);
        let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            b"q 2 0 0 2 0 0 cm /Im0 Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 2.into(), 2.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn work_item(part_number: u32) -> WorkItem {
    WorkItem {
        jurisdiction: Jurisdiction {
            state_code: "S04".to_string(),
            district_code: "S0401".to_string(),
            constituency: 12,
        },
        language: "ENG".to_string(),
        part: PartInfo {
            constituency: 12,
            part_number,
            part_name: format!("Part {}", part_number),
            state_code: "S04".to_string(),
            district_code: "S0401".to_string(),
        },
    }
}

#[tokio::test]
async fn test_raw_seal_waits_for_last_part() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_draft_documents(&server, b"%PDF-1.4 electoral roll").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), 1);
    let remote = memory_remote(dir.path());
    let fetcher = Fetcher::new(
        ApiClient::new(&config.source).unwrap(),
        DataLayout::new(dir.path()),
        RetryPolicy::from_config(&config.retry),
        solver(),
    );
    let key = group_key();
    let parts = [1, 2, 3];

    for part in 1..=2 {
        let result = fetcher.fetch_part(&work_item(part)).await.unwrap();
        assert_eq!(result.status(), PartStatus::Fetched);
        assert!(!remote.archive.seal(&key, &parts, Tier::Raw).unwrap());
    }

    let last = fetcher.fetch_part(&work_item(3)).await.unwrap();
    assert_eq!(last.status(), PartStatus::Unavailable);
    assert_eq!(std::fs::metadata(&last.path).unwrap().len(), 0);
    assert!(remote.archive.seal(&key, &parts, Tier::Raw).unwrap());
    assert!(!remote.archive.seal(&key, &parts, Tier::Pages).unwrap());
}

#[tokio::test]
async fn test_crawl_ships_group_and_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_draft_documents(&server, b"%PDF-1.4 electoral roll").await;

    let dir = TempDir::new().unwrap();
    let remote = memory_remote(dir.path());

    let mut first = Coordinator::new(
        create_test_config(&server, dir.path(), 1),
        solver(),
        Some(Arc::clone(&remote.archive)),
        Vec::new(),
    )
    .await
    .unwrap();
    first.run().await.unwrap();
    let (stats, report) = first.finish().await.unwrap();

    assert!(report.is_none());
    assert_eq!(stats.parts_fetched, 2);
    assert_eq!(stats.parts_unavailable, 1);
    assert_eq!(stats.groups_shipped, 1);
    assert!(remote.raw.head(&tar_location()).await.is_ok());
    assert!(!dir.path().join("raw/S04/12/ENG").exists());
    assert!(!dir.path().join("raw/S04/12/ENG.tar").exists());

    // second run: the ledger built from the bucket skips the group entirely
    let mut second = Coordinator::new(
        create_test_config(&server, dir.path(), 1),
        solver(),
        Some(Arc::clone(&remote.archive)),
        Vec::new(),
    )
    .await
    .unwrap();
    assert!(second.ledger().contains(&group_key()));
    second.run().await.unwrap();

    assert_eq!(second.stats().groups_skipped, 1);
    assert_eq!(second.stats().parts_fetched, 0);
    assert_eq!(second.stats().groups_shipped, 0);
}

#[tokio::test]
async fn test_catalog_is_cached_across_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/states/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"stateCd": "S04", "stateName": "Bihar"}
        ])))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server).await;
    Mock::given(method("POST"))
        .and(path(DRAFT))
        .respond_with(document(Some(b"%PDF-1.4 electoral roll")))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    for _ in 0..2 {
        let mut coordinator = Coordinator::new(
            create_test_config(&server, dir.path(), 1),
            solver(),
            None,
            Vec::new(),
        )
        .await
        .unwrap();
        coordinator.run().await.unwrap();
    }

    let layout = DataLayout::new(dir.path());
    assert!(layout.state_list_file().is_file());
    assert!(layout.languages_file("S04", 12).is_file());
    assert!(layout.parts_file("S04", 12).is_file());
}

#[tokio::test]
async fn test_invalid_captcha_is_retried_without_backoff() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("POST"))
        .and(path(DRAFT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "Failed", "message": "Invalid Catpcha", "file": null
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAFT))
        .respond_with(document(Some(b"%PDF-1.4 electoral roll")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    // a backoff sleep would stall the test for a minute
    let config = create_test_config(&server, dir.path(), 60_000);
    let mut coordinator = Coordinator::new(config, solver(), None, Vec::new()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(20), coordinator.run())
        .await
        .expect("captcha rejection must not back off")
        .unwrap();

    let captcha_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == CAPTCHA)
        .count();
    assert_eq!(captcha_requests, 4);
    assert_eq!(coordinator.stats().parts_fetched, 3);
}

#[tokio::test]
async fn test_unpublished_draft_falls_back_to_final() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("POST"))
        .and(path(DRAFT))
        .respond_with(unpublished())
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(FINAL))
        .respond_with(document(Some(b"%PDF-1.4 final roll")))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut coordinator = Coordinator::new(
        create_test_config(&server, dir.path(), 1),
        solver(),
        None,
        Vec::new(),
    )
    .await
    .unwrap();
    coordinator.run().await.unwrap();

    for part in 1..=3 {
        let final_file = dir.path().join(format!("raw/S04/12/ENG/final-{}.pdf", part));
        let draft_file = dir.path().join(format!("raw/S04/12/ENG/draft-{}.pdf", part));
        assert_eq!(std::fs::read(final_file).unwrap(), b"%PDF-1.4 final roll");
        assert!(!draft_file.exists());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_conversion_mode_ships_both_tiers() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let payload = scan_pdf(2);
    mount_draft_documents(&server, &payload).await;

    let dir = TempDir::new().unwrap();
    let remote = memory_remote(dir.path());
    let mut config = create_test_config(&server, dir.path(), 1);
    config.conversion = ConversionConfig {
        enabled: true,
        queue_capacity: 1,
        workers: 1,
        page_threads: 2,
    };

    let mut coordinator = Coordinator::new(config, solver(), Some(Arc::clone(&remote.archive)), Vec::new())
        .await
        .unwrap();
    coordinator.run().await.unwrap();
    assert!(coordinator.ledger().contains(&group_key()));
    let (stats, report) = coordinator.finish().await.unwrap();
    let report = report.unwrap();

    assert_eq!(stats.parts_fetched, 2);
    assert_eq!(stats.groups_shipped, 1);
    assert_eq!(report.converted, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.shipped, 1);
    assert!(remote.raw.head(&tar_location()).await.is_ok());
    assert!(remote.pages.head(&tar_location()).await.is_ok());

    // the raw archive holds the fetched PDF, not the conversion sentinel
    let raw_tar = remote
        .raw
        .get(&tar_location())
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let mut archive = tar::Archive::new(&raw_tar[..]);
    let mut archived = None;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if *entry.path().unwrap() == *Path::new("ENG/draft-1.pdf") {
            let mut contents = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut contents).unwrap();
            archived = Some(contents);
        }
    }
    assert_eq!(archived, Some(payload));

    let layout = DataLayout::new(dir.path());
    assert!(!layout.language_dir(&group_key(), Tier::Raw).exists());
    assert!(!layout.language_dir(&group_key(), Tier::Pages).exists());
}
