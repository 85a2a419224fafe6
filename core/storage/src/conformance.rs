//! Behaviour every backend must show, run against each backend's tests.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use tokio::io::AsyncReadExt;

use omnistore_common::Error;

use crate::provider::{Body, LocalFile, Storage};
use crate::signing::EXPIRES_PARAM;

/// Run every public-access check against `storage`.
pub async fn run_all(storage: Arc<dyn Storage>) {
    round_trip(&*storage).await;
    stream_round_trip(&*storage).await;
    path_equivalence(&*storage).await;
    list_prefix(&*storage).await;
    delete_idempotent(&*storage).await;
    missing_keys(&*storage).await;
    empty_keys(&*storage).await;
    collapsed_segments(&*storage).await;
    put_rewinds_seekable(&*storage).await;
    overwrite(&*storage).await;
    concurrent_get(&*storage).await;
    objects_reenter_backend(&*storage).await;
    batch_delete(&*storage).await;
    public_url(&*storage).await;
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn read_all(mut file: LocalFile) -> Vec<u8> {
    let mut content = Vec::new();
    file.read_to_end(&mut content).await.unwrap();
    content
}

fn keys(objects: &[crate::Object]) -> HashSet<String> {
    objects.iter().map(|o| o.path().to_string()).collect()
}

pub async fn round_trip(storage: &dyn Storage) {
    for len in [0, 1, 64 * 1024 + 3, 3 * 1024 * 1024] {
        let key = format!("conformance/round-trip/{}.bin", len);
        let data = payload(len);

        let object = storage.put(&key, data.clone().into()).await.unwrap();
        assert_eq!(object.path(), key);
        assert_eq!(object.name(), format!("{}.bin", len));

        let file = storage.get(&key).await.unwrap();
        assert_eq!(read_all(file).await, data, "round trip of {} bytes", len);
    }
}

pub async fn stream_round_trip(storage: &dyn Storage) {
    let key = "conformance/stream/data.bin";
    let data = payload(200 * 1024);
    storage.put(key, data.clone().into()).await.unwrap();

    let mut stream = storage.get_stream(key).await.unwrap();
    let mut content = Vec::new();
    while let Some(chunk) = stream.next().await {
        content.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(content, data);
}

pub async fn path_equivalence(storage: &dyn Storage) {
    let key = "conformance/equivalence/a/b.txt";
    let endpoint = storage.endpoint();
    let absolute = if endpoint.starts_with('/') {
        format!("{}{}", endpoint, key)
    } else {
        format!("https://{}/{}", endpoint, key)
    };

    assert_eq!(storage.to_key(key), key);
    assert_eq!(storage.to_key(&format!("/{}", key)), key);
    assert_eq!(storage.to_key(&absolute), key);

    storage.put(&format!("/{}", key), "same".into()).await.unwrap();
    for path in [key.to_string(), format!("/{}", key), absolute] {
        let file = storage.get(&path).await.unwrap();
        assert_eq!(read_all(file).await, b"same", "reading through {}", path);
    }
}

pub async fn list_prefix(storage: &dyn Storage) {
    storage.put("conformance/list/dir/a.txt", "a".into()).await.unwrap();
    storage.put("conformance/list/dir/b.txt", "b".into()).await.unwrap();
    storage.put("conformance/list/dirx/c.txt", "c".into()).await.unwrap();
    storage.put("conformance/list/other.txt", "o".into()).await.unwrap();

    let expected: HashSet<String> = ["conformance/list/dir/a.txt", "conformance/list/dir/b.txt"]
        .into_iter()
        .map(String::from)
        .collect();

    let listed = storage.list("conformance/list/dir/").await.unwrap();
    assert_eq!(keys(&listed), expected);

    let listed = storage.list("/conformance/list/dir/").await.unwrap();
    assert_eq!(keys(&listed), expected);

    let listed = storage.list("conformance/list/").await.unwrap();
    assert_eq!(listed.len(), 4);

    let listed = storage.list("conformance/list/nothing-here/").await.unwrap();
    assert!(listed.is_empty());

    let everything = storage.list("").await.unwrap();
    assert!(keys(&everything).is_superset(&expected));
}

pub async fn delete_idempotent(storage: &dyn Storage) {
    let key = "conformance/delete/gone.txt";
    storage.put(key, "bye".into()).await.unwrap();

    storage.delete(key).await.unwrap();
    storage.delete(key).await.unwrap();

    assert!(storage.get(key).await.unwrap_err().is_not_found());
    let listed = storage.list("conformance/delete/").await.unwrap();
    assert!(listed.is_empty());
}

pub async fn missing_keys(storage: &dyn Storage) {
    let key = "conformance/missing/nothing.txt";
    assert!(matches!(storage.get(key).await, Err(Error::NotFound(_))));
    assert!(matches!(storage.get_stream(key).await, Err(Error::NotFound(_))));
}

pub async fn empty_keys(storage: &dyn Storage) {
    assert!(matches!(storage.get("").await, Err(Error::InvalidInput(_))));
    assert!(matches!(storage.put("/", "x".into()).await, Err(Error::InvalidInput(_))));
}

pub async fn collapsed_segments(storage: &dyn Storage) {
    let object = storage.put("conformance/slashes//a.txt", "s".into()).await.unwrap();
    assert_eq!(object.path(), "conformance/slashes/a.txt");

    let listed = storage.list("conformance/slashes/").await.unwrap();
    let expected: HashSet<String> = ["conformance/slashes/a.txt".to_string()].into_iter().collect();
    assert_eq!(keys(&listed), expected);

    let file = storage.get("conformance//slashes/a.txt").await.unwrap();
    assert_eq!(read_all(file).await, b"s");

    let err = storage.put("conformance/slashes/dir/", "x".into()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(storage.list("conformance/slashes/").await.unwrap().len(), 1);
}

pub async fn put_rewinds_seekable(storage: &dyn Storage) {
    let key = "conformance/seekable/data.txt";
    let mut cursor = Cursor::new(b"seekable content".to_vec());
    cursor.set_position(8);

    storage.put(key, Body::seekable(&mut cursor)).await.unwrap();
    let file = storage.get(key).await.unwrap();
    assert_eq!(read_all(file).await, b"seekable content");

    // Reusing the exhausted buffer uploads the same bytes again.
    storage.put(key, Body::seekable(&mut cursor)).await.unwrap();
    let file = storage.get(key).await.unwrap();
    assert_eq!(read_all(file).await, b"seekable content");
}

pub async fn overwrite(storage: &dyn Storage) {
    let key = "conformance/overwrite/file.txt";
    storage.put(key, "first version".into()).await.unwrap();
    storage.put(key, "second".into()).await.unwrap();

    let file = storage.get(key).await.unwrap();
    assert_eq!(read_all(file).await, b"second");
    assert_eq!(storage.list("conformance/overwrite/").await.unwrap().len(), 1);
}

pub async fn concurrent_get(storage: &dyn Storage) {
    let key = "conformance/concurrent/data.bin";
    let data = payload(512 * 1024);
    storage.put(key, Bytes::from(data.clone()).into()).await.unwrap();

    let (first, second) = tokio::join!(storage.get(key), storage.get(key));
    let mut first = first.unwrap();
    let second = second.unwrap();

    // Consuming one copy leaves the other at offset 0.
    let mut head = vec![0u8; 1024];
    first.read_exact(&mut head).await.unwrap();
    assert_eq!(read_all(second).await, data);

    let mut rest = Vec::new();
    first.read_to_end(&mut rest).await.unwrap();
    head.extend_from_slice(&rest);
    assert_eq!(head, data);
}

pub async fn objects_reenter_backend(storage: &dyn Storage) {
    storage.put("conformance/reenter/x.txt", "x".into()).await.unwrap();

    let listed = storage.list("conformance/reenter/").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name(), "x.txt");

    let file = listed[0].get().await.unwrap();
    assert_eq!(read_all(file).await, b"x");
}

pub async fn batch_delete(storage: &dyn Storage) {
    let keys: Vec<String> = (0..3).map(|i| format!("conformance/batch/{}.txt", i)).collect();
    for key in &keys {
        storage.put(key, "batch".into()).await.unwrap();
    }

    let mut targets = keys.clone();
    targets.push("conformance/batch/never-existed.txt".to_string());
    storage.delete_many(&targets).await.unwrap();

    assert!(storage.list("conformance/batch/").await.unwrap().is_empty());
}

pub async fn public_url(storage: &dyn Storage) {
    assert_eq!(storage.get_url("a.txt").await.unwrap(), "a.txt");
    assert_eq!(storage.get_url("/dir/a.txt").await.unwrap(), "dir/a.txt");
}

/// Check a private backend signs with an expiry inside `window`.
pub async fn private_url(storage: &dyn Storage, window: Duration) {
    let before = Utc::now().timestamp();
    let url = storage.get_url("/dir/a.txt").await.unwrap();
    let after = Utc::now().timestamp();

    assert_ne!(url, "dir/a.txt");
    assert!(url.contains("dir/a.txt"));

    let marker = format!("{}=", EXPIRES_PARAM);
    let expires: i64 = url
        .split(['?', '&'])
        .find_map(|part| part.strip_prefix(marker.as_str()))
        .expect("signed URL carries an expiry")
        .parse()
        .unwrap();

    assert!(expires > before);
    assert!(expires <= after + window.as_secs() as i64);
}
