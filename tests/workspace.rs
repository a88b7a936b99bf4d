//! Library-level tests driving `Workspace` against real SQLite files.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mnemo::config::{load_config, Config};
use mnemo::workspace::Workspace;
use mnemo_core::content::Body;
use mnemo_core::models::{Document, MirroredMessage, SyncState};
use mnemo_core::sync::{PushOutcome, RemoteDeleteOutcome};

fn write_config(dir: &Path, name: &str, extra: &str) -> Config {
    let path = dir.join(format!("{}.toml", name));
    let content = format!(
        "[db]\npath = \"{}\"\n\n[embedding]\nprovider = \"hash\"\ndims = 1024\n\n{}",
        dir.join(format!("{}.sqlite", name)).display(),
        extra
    );
    fs::write(&path, content).unwrap();
    load_config(&path).unwrap()
}

fn synced_config(dir: &Path, name: &str, remote: &Path) -> Config {
    write_config(
        dir,
        name,
        &format!(
            "[sync]\nprovider = \"directory\"\nroot = \"{}\"\n",
            remote.display()
        ),
    )
}

fn note(title: &str, markup: &str) -> Document {
    let mut d = Document::new(title, "note");
    d.content = Body::from_markup(markup).to_json();
    d
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let cfg = write_config(tmp.path(), "local", "");

    let ws = Workspace::open(&cfg).await.unwrap();
    assert!(!ws.is_demo());
    let saved = ws.save(note("Persistent", "kept on disk")).await.unwrap();
    assert!(saved.embedded);
    ws.close().await;

    let ws = Workspace::open(&cfg).await.unwrap();
    let doc = ws.get(&saved.document.id).await.unwrap().unwrap();
    assert_eq!(doc.title, "Persistent");
    assert_eq!(ws.type_schemas().await.unwrap().len(), 3);
    ws.close().await;
}

#[tokio::test]
async fn test_save_stamps_monotonic_last_modified() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(&write_config(tmp.path(), "local", ""))
        .await
        .unwrap();
    let first = ws.save(note("Draft", "v1")).await.unwrap().document;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let mut edited = first.clone();
    edited.content = Body::from_markup("v2").to_json();
    let second = ws.save(edited).await.unwrap().document;
    assert!(second.last_modified > first.last_modified);
    ws.close().await;
}

#[tokio::test]
async fn test_push_then_pull_between_devices() {
    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("remote");
    let laptop = Workspace::open(&synced_config(tmp.path(), "laptop", &remote))
        .await
        .unwrap();
    let phone = Workspace::open(&synced_config(tmp.path(), "phone", &remote))
        .await
        .unwrap();

    let saved = laptop.save(note("Shared plan", "ship it")).await.unwrap();
    let remote_ref = match &saved.push {
        PushOutcome::Created(r) => r.clone(),
        other => panic!("expected a remote create, got {:?}", other),
    };
    assert_eq!(saved.document.remote_ref(), Some(remote_ref.as_str()));

    let report = phone.pull().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 0);
    let on_phone = phone.store().find_by_remote_ref(&remote_ref).await.unwrap().unwrap();
    assert_eq!(on_phone.title, "Shared plan");
    assert_eq!(on_phone.last_modified, saved.document.last_modified);
    assert!(phone.store().get_embedding(&on_phone.id).await.unwrap().is_some());

    // A second pull with nothing new applies nothing.
    let again = phone.pull().await.unwrap();
    assert_eq!(again.applied, 0);

    // Edit on the phone, pull on the laptop: the laptop's local id is kept.
    let mut edited = on_phone.clone();
    edited.title = "Shared plan v2".to_string();
    let pushed = phone.save(edited).await.unwrap();
    assert_eq!(pushed.push, PushOutcome::Updated);

    laptop.pull().await.unwrap();
    let on_laptop = laptop.get(&saved.document.id).await.unwrap().unwrap();
    assert_eq!(on_laptop.title, "Shared plan v2");
    assert_eq!(laptop.list(None, 10).await.unwrap().len(), 1);

    // Deleting on the laptop removes the remote copy; the phone follows.
    let deleted = laptop.delete(&saved.document.id).await.unwrap();
    assert_eq!(deleted.remote, RemoteDeleteOutcome::Deleted);
    let report = phone.pull().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(phone.get(&on_phone.id).await.unwrap().is_none());

    laptop.close().await;
    phone.close().await;
}

#[tokio::test]
async fn test_failed_push_keeps_local_write() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    fs::write(&blocker, "file in the way").unwrap();
    let cfg = synced_config(tmp.path(), "offline", &blocker.join("remote"));

    let ws = Workspace::open(&cfg).await.unwrap();
    let saved = ws.save(note("Offline", "written anyway")).await.unwrap();
    assert!(matches!(saved.push, PushOutcome::Failed(_)));

    let doc = ws.get(&saved.document.id).await.unwrap().unwrap();
    assert_eq!(doc.sync_state, SyncState::LocalOnly);
    ws.close().await;
}

#[tokio::test]
async fn test_unopenable_store_falls_back_to_demo_mode() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let path = tmp.path().join("demo.toml");
    fs::write(
        &path,
        format!(
            "[db]\npath = \"{}\"\n[sync]\nprovider = \"directory\"\nroot = \"{}\"\n",
            blocker.join("db.sqlite").display(),
            tmp.path().join("remote").display()
        ),
    )
    .unwrap();
    let cfg = load_config(&path).unwrap();

    let ws = Workspace::open(&cfg).await.unwrap();
    assert!(ws.is_demo());
    assert!(!ws.sync_enabled());

    let saved = ws.save(note("Demo", "in memory")).await.unwrap();
    assert_eq!(saved.push, PushOutcome::Skipped);
    assert!(ws.get(&saved.document.id).await.unwrap().is_some());
    assert!(ws.pull().await.is_err());
}

#[tokio::test]
async fn test_search_combines_keyword_semantic_and_mirror() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(&write_config(tmp.path(), "search", ""))
        .await
        .unwrap();

    let exact = ws
        .save(note("Crème brûlée recipe", "caramelized sugar"))
        .await
        .unwrap()
        .document;
    let semantic = ws
        .save(note("Runtime notes", "notes on the async rust runtime"))
        .await
        .unwrap()
        .document;
    ws.save(note("Groceries", "bananas and milk")).await.unwrap();
    ws.import_mirrored_messages(&[MirroredMessage {
        id: "m1".to_string(),
        subject: "Creme brulee night".to_string(),
        sender: "friend@example.com".to_string(),
        snippet: String::new(),
        received_at: 1,
    }])
    .await
    .unwrap();

    let response = ws.search("creme brulee", false).await.unwrap();
    assert_eq!(response.ids(), vec![exact.id.as_str()]);
    assert_eq!(response.mirrored.len(), 1);

    let response = ws.search("rust async runtime", true).await.unwrap();
    assert_eq!(response.ids(), vec![semantic.id.as_str()]);
    let explain = response.results[0].explain.as_ref().unwrap();
    assert_eq!(explain.keyword_score, 0.0);
    assert!(explain.semantic_score > 0.55);

    // Whitespace is an ordinary substring; only the empty query matches nothing.
    assert_eq!(ws.search(" ", false).await.unwrap().results.len(), 3);
    assert!(ws.search("", false).await.unwrap().results.is_empty());
    ws.close().await;
}

#[tokio::test]
async fn test_backlinks_and_outgoing_links() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(&write_config(tmp.path(), "links", ""))
        .await
        .unwrap();

    let target = ws.save(note("Ada", "mathematician")).await.unwrap().document;
    let older = ws
        .save(note(
            "Meeting",
            &format!("Talked with @[[{}|Ada]]\n\n- follow up with @[[{}]]", target.id, target.id),
        ))
        .await
        .unwrap()
        .document;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = ws
        .save(note("Journal", &format!("Lunch with @[[{}|Ada]]", target.id)))
        .await
        .unwrap()
        .document;

    let groups = ws.backlinks(&target.id).await.unwrap();
    let sources: Vec<&str> = groups.iter().map(|g| g.source_id.as_str()).collect();
    assert_eq!(sources, vec![newer.id.as_str(), older.id.as_str()]);
    assert_eq!(groups[1].contexts.len(), 2);
    assert_eq!(groups[1].contexts[0].text, "Talked with @Ada");

    let outgoing = ws.outgoing(&older.id).await.unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].id, target.id);

    // Deleting a source drops its backlinks on the next query.
    ws.delete(&newer.id).await.unwrap();
    assert_eq!(ws.backlinks(&target.id).await.unwrap().len(), 1);
    ws.close().await;
}

#[tokio::test]
async fn test_remote_folder_entries_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let remote_root: PathBuf = tmp.path().join("remote");
    let ws = Workspace::open(&synced_config(tmp.path(), "folders", &remote_root))
        .await
        .unwrap();

    let remote = mnemo::remote_fs::DirectoryRemote::new("directory", &remote_root);
    remote.create_folder("Archive").await.unwrap();

    let report = ws.pull().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied, 0);
    assert!(ws.list(None, 10).await.unwrap().is_empty());
    ws.close().await;
}
