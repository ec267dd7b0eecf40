use std::path::PathBuf;

use nvrd::config::StaticConfig;
use nvrd::http::request::RequestBuilder;
use nvrd::http::response::{Response, StatusCode};
use nvrd::server::static_files::{start, StartError, StaticFiles};

fn web_root(test: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("nvrd-static-{}-{test}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    root
}

fn resolver(root: &PathBuf) -> StaticFiles {
    StaticFiles::new(&StaticConfig {
        web_root: root.clone(),
        index_file: "index.html".to_string(),
    })
}

#[test]
fn test_resolves_existing_file() {
    let root = web_root("plain");
    std::fs::write(root.join("app.css"), "body{}").unwrap();

    let sf = resolver(&root);
    let descriptor = sf.resolve("/app.css").unwrap();
    assert_eq!(descriptor.path, root.join("app.css"));
    assert_eq!(descriptor.content_type, None);
    assert!(descriptor.extra_headers.is_empty());
}

#[test]
fn test_directory_rewrites_to_index() {
    let root = web_root("index");
    std::fs::write(root.join("index.html"), "<html></html>").unwrap();

    let sf = resolver(&root);
    let descriptor = sf.resolve("/").unwrap();
    assert_eq!(descriptor.path, root.join("index.html"));
}

#[test]
fn test_directory_without_index_is_not_found() {
    let root = web_root("noindex");
    std::fs::create_dir_all(root.join("empty")).unwrap();

    let sf = resolver(&root);
    assert!(sf.resolve("/empty").is_none());
}

#[test]
fn test_missing_file_is_not_found() {
    let root = web_root("missing");
    let sf = resolver(&root);
    assert!(sf.resolve("/nope.js").is_none());
}

#[test]
fn test_parent_traversal_is_rejected() {
    let root = web_root("traversal");
    let sf = resolver(&root);
    assert!(sf.resolve("/../etc/passwd").is_none());
    assert!(sf.resolve("/a/../../b").is_none());
}

#[test]
fn test_precompressed_sibling_fallback() {
    let root = web_root("gz");
    std::fs::write(root.join("app.js.gz"), b"\x1f\x8b fake gzip").unwrap();

    let sf = resolver(&root);
    let descriptor = sf.resolve("/app.js").unwrap();
    assert_eq!(descriptor.path, root.join("app.js.gz"));
    assert_eq!(
        descriptor.content_type.as_deref(),
        Some("application/javascript; charset=utf-8")
    );
    assert!(descriptor
        .extra_headers
        .contains(&("Content-Encoding".to_string(), "gzip".to_string())));
}

#[test]
fn test_uncompressed_file_wins_over_sibling() {
    let root = web_root("gz-both");
    std::fs::write(root.join("app.js"), "plain").unwrap();
    std::fs::write(root.join("app.js.gz"), "gz").unwrap();

    let sf = resolver(&root);
    let descriptor = sf.resolve("/app.js").unwrap();
    assert_eq!(descriptor.path, root.join("app.js"));
}

#[test]
fn test_fallback_handler_populates_descriptor_or_404() {
    let root = web_root("handler");
    std::fs::write(root.join("live.html"), "<html></html>").unwrap();
    let sf = resolver(&root);

    let req = RequestBuilder::new().path("/live.html").build();
    let mut res = Response::new(StatusCode::Ok);
    sf.handle(&req, &mut res);
    assert!(res.deferred_file.is_some());
    assert_eq!(res.status, StatusCode::Ok);

    let req = RequestBuilder::new().path("/gone.html").build();
    let mut res = Response::new(StatusCode::Ok);
    sf.handle(&req, &mut res);
    assert!(res.deferred_file.is_none());
    assert_eq!(res.status, StatusCode::NotFound);
}

#[tokio::test]
async fn test_phase_two_open_failure_is_io() {
    let root = web_root("phase2-missing");
    let sf = resolver(&root);
    std::fs::write(root.join("clip.mp4"), "data").unwrap();
    let mut descriptor = sf.resolve("/clip.mp4").unwrap();

    // Resolution raced a deletion: phase 2 must surface an I/O error.
    descriptor.path = root.join("deleted.mp4");
    match start(&descriptor, None).await {
        Err(StartError::Io(_)) => {}
        Err(e) => panic!("expected Io error, got {e:?}"),
        Ok(_) => panic!("expected Io error, got success"),
    }
}

#[tokio::test]
async fn test_phase_two_rejects_unsatisfiable_range() {
    let root = web_root("phase2-range");
    std::fs::write(root.join("clip.mp4"), vec![0u8; 100]).unwrap();
    let sf = resolver(&root);
    let descriptor = sf.resolve("/clip.mp4").unwrap();

    match start(&descriptor, Some("bytes=500-")).await {
        Err(StartError::NotSatisfiable) => {}
        Err(e) => panic!("expected NotSatisfiable, got {e:?}"),
        Ok(_) => panic!("expected NotSatisfiable, got success"),
    }
}
