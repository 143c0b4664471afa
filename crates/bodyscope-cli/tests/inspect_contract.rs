use assert_cmd::Command;
use std::io::Cursor;

fn bodyscope() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bodyscope"));
    cmd.env("BODYSCOPE_PDF_RENDERER", "off");
    cmd
}

fn run_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).expect("parse json output")
}

#[test]
fn inspect_small_json_file_is_pretty_and_complete() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("resp.json");
    std::fs::write(&p, br#"{"user":{"id":7,"tags":["a","b"]}}"#).unwrap();

    let v = run_json(bodyscope().arg("inspect").arg(&p).args(["--content-type", "application/json"]));
    let r = &v["result"];
    assert_eq!(r["kind"].as_str(), Some("json"));
    assert_eq!(r["present"].as_bool(), Some(true));
    assert_eq!(r["pretty"].as_bool(), Some(true));
    let text = r["text"].as_str().unwrap();
    assert!(text.starts_with("{\n    \"user\": {\n        \"id\": 7"), "{text}");
    assert_eq!(r["pagination"]["has_more"].as_bool(), Some(false));
}

#[test]
fn inspect_large_text_reports_more_pages() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("log.txt");
    std::fs::write(&p, "line of log output\n".repeat(500)).unwrap();

    let v = run_json(bodyscope().arg("inspect").arg(&p).args(["--page-size", "2048"]));
    let r = &v["result"];
    assert_eq!(r["kind"].as_str(), Some("plain_text"));
    assert_eq!(r["pagination"]["loaded_bytes"].as_u64(), Some(2048));
    assert_eq!(r["pagination"]["total_size"].as_u64(), Some(9500));
    assert_eq!(r["pagination"]["has_more"].as_bool(), Some(true));
}

#[test]
fn inspect_png_reports_dimensions() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("pixel");
    let img = image::DynamicImage::new_rgba8(7, 3);
    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, image::ImageFormat::Png).unwrap();
    std::fs::write(&p, png.into_inner()).unwrap();

    let v = run_json(bodyscope().arg("inspect").arg(&p));
    let r = &v["result"];
    assert_eq!(r["kind"].as_str(), Some("image"));
    assert_eq!(r["image"]["width"].as_u64(), Some(7));
    assert_eq!(r["image"]["height"].as_u64(), Some(3));
    assert_eq!(r["image"]["format"].as_str(), Some("PNG"));
    assert_eq!(r["image"]["has_alpha"].as_bool(), Some(true));
    assert!(r["text"].is_null());
}

#[test]
fn inspect_truncated_pdf_is_error_state_not_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("broken.pdf");
    std::fs::write(&p, b"%PDF-1.4").unwrap();

    let v = run_json(bodyscope().arg("inspect").arg(&p));
    let r = &v["result"];
    assert_eq!(r["kind"].as_str(), Some("pdf"));
    assert_eq!(r["pdf"]["state"]["state"].as_str(), Some("error"));
    assert!(v["renderer"].is_null());
}

#[test]
fn ingest_then_inspect_by_id() {
    let tmp = tempfile::tempdir().unwrap();
    let store = tmp.path().join("store");
    let p = tmp.path().join("form");
    std::fs::write(&p, b"a=1&b=two").unwrap();

    let v = run_json(
        bodyscope()
            .arg("ingest")
            .arg(&p)
            .args(["--id", "txn-42", "--content-type", "application/x-www-form-urlencoded", "--store"])
            .arg(&store),
    );
    assert_eq!(v["body"]["id"].as_str(), Some("txn-42"));
    assert_eq!(v["body"]["size"].as_u64(), Some(9));

    let v = run_json(bodyscope().args(["inspect", "--id", "txn-42", "--store"]).arg(&store));
    let r = &v["result"];
    assert_eq!(r["kind"].as_str(), Some("form_data"));
    assert_eq!(r["text"].as_str(), Some("a=1&b=two"));

    let v = run_json(bodyscope().args(["inspect", "--id", "nope", "--store"]).arg(&store));
    assert_eq!(v["result"]["present"].as_bool(), Some(false));
}
