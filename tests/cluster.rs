mod common;

use std::time::Duration;

use common::{call, call_ok, spawn_data_node, spawn_name_node};
use dfs_mamont::codec;
use dfs_mamont::error::Error;
use dfs_mamont::heartbeat::{self, Heartbeat};
use dfs_mamont::http_node::HttpDataNode;
use dfs_mamont::members::Status;
use dfs_mamont::node::DataNode;

#[tokio::test]
async fn join_handshake_stores_source_ip_callback() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(Some(&name.url)).await;

    let member = name.db.get(data.service.id()).expect("member registered");
    assert_eq!(member.status, Status::New);
    // No advertised host, so the callback URL is built from the loopback
    // source address of the handshake.
    assert_eq!(member.url, data.url);
    assert_eq!(member.public_url, data.url);
}

#[tokio::test]
async fn join_body_without_host_uses_peer_address() {
    let name = spawn_name_node().await;

    call_ok(&name.url, "nodes/join", b"8180 abc123".to_vec()).await;
    let member = name.db.get("abc123").expect("member registered");
    assert_eq!(member.url, "http://127.0.0.1:8180/");

    let (status, body) = call(&name.url, "nodes/join", b"8180 abc123".to_vec()).await;
    assert_eq!(status.as_u16(), 400);
    assert!(String::from_utf8_lossy(&body).contains("already a member"));
}

#[tokio::test]
async fn single_node_cluster_serves_writes_and_reads() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(Some(&name.url)).await;

    heartbeat::tick::<HttpDataNode>(&name.db).await;
    assert_eq!(name.db.get(data.service.id()).unwrap().status, Status::Alive);

    call_ok(&name.url, "mkfs", Vec::new()).await;
    call_ok(&name.url, "touch", b"/a".to_vec()).await;
    call_ok(&name.url, "tee", codec::encode_blob("/a", b"hello")).await;

    // Reads are redirects: the name node answers with a replica URL, which
    // the client replays with the same body.
    let redirect = String::from_utf8(call_ok(&name.url, "cat", b"/a".to_vec()).await).unwrap();
    assert_eq!(redirect, format!("{}cat", data.url));
    let served = reqwest::Client::new()
        .post(&redirect)
        .body("/a")
        .send()
        .await
        .expect("follow redirect");
    assert_eq!(served.bytes().await.unwrap().as_ref(), b"hello");

    // df aggregates one row: id plus three volume integers.
    let table = codec::decode_matrix(&call_ok(&name.url, "df", Vec::new()).await).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].len(), 4);
    assert_eq!(table[0][0], data.service.id());
    assert!(table[0][1].parse::<u64>().unwrap() > 0);
}

#[tokio::test]
async fn ls_redirect_names_the_chosen_replica() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;
    call_ok(&name.url, "touch", b"/a".to_vec()).await;

    let redirect = String::from_utf8(call_ok(&name.url, "ls", b"/".to_vec()).await).unwrap();
    assert_eq!(redirect, format!("{}ls", data.url));

    let listing =
        reqwest::Client::new().post(&redirect).body("/").send().await.expect("follow redirect");
    let names = codec::decode_list(&listing.bytes().await.unwrap()).unwrap();
    assert_eq!(names, ["a"]);
}

#[tokio::test]
async fn late_joiner_clones_the_cluster_state() {
    let name = spawn_name_node().await;
    let first = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;

    call_ok(&name.url, "mkdir", b"/docs".to_vec()).await;
    call_ok(&name.url, "tee", codec::encode_blob("/docs/a", b"replicate me")).await;
    call_ok(&name.url, "cd", b"/docs".to_vec()).await;

    let second = spawn_data_node(Some(&name.url)).await;
    assert_eq!(name.db.get(second.service.id()).unwrap().status, Status::New);

    heartbeat::tick::<HttpDataNode>(&name.db).await;
    assert_eq!(name.db.get(second.service.id()).unwrap().status, Status::Alive);

    assert_eq!(second.client().cat("/docs/a").await.expect("cloned file"), b"replicate me");
    // The donor's working directory travels with the snapshot.
    let (workdir, _, _) = second.client().stat(".").await.unwrap();
    assert_eq!(workdir, "/docs");
    drop(first);
}

#[tokio::test]
async fn dead_member_is_detected_and_writes_continue() {
    let name = spawn_name_node().await;
    let first = spawn_data_node(Some(&name.url)).await;
    let second = spawn_data_node(Some(&name.url)).await;

    heartbeat::tick::<HttpDataNode>(&name.db).await;
    assert_eq!(name.db.get(first.service.id()).unwrap().status, Status::Alive);
    assert_eq!(name.db.get(second.service.id()).unwrap().status, Status::Alive);

    second.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The unreachable member is absorbed; the write still succeeds.
    call_ok(&name.url, "tee", codec::encode_blob("/b", b"x")).await;
    assert_eq!(first.client().cat("/b").await.unwrap(), b"x");

    heartbeat::tick::<HttpDataNode>(&name.db).await;
    assert_eq!(name.db.get(second.service.id()).unwrap().status, Status::Dead);
    assert_eq!(name.db.get(first.service.id()).unwrap().status, Status::Alive);
}

#[tokio::test]
async fn resurrected_member_resyncs_from_a_donor() {
    let name = spawn_name_node().await;
    let first = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;
    call_ok(&name.url, "tee", codec::encode_blob("/b", b"x")).await;

    // A reachable node carrying stale state, registered as DEAD: exactly what
    // the table looks like when a member comes back from the dead.
    let second = spawn_data_node(None).await;
    second.client().tee("/stale", b"old").await.unwrap();
    name.db.create(second.service.id(), &second.url, None).unwrap();
    name.db.set_status(second.service.id(), Status::Dead).unwrap();

    heartbeat::tick::<HttpDataNode>(&name.db).await;

    assert_eq!(name.db.get(second.service.id()).unwrap().status, Status::Alive);
    assert_eq!(second.client().cat("/b").await.expect("resynced file"), b"x");
    assert!(matches!(second.client().cat("/stale").await, Err(Error::Remote(_))));
    drop(first);
}

#[tokio::test]
async fn rmdir_force_wire_form() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;

    call_ok(&name.url, "mkdir", b"/full".to_vec()).await;
    call_ok(&name.url, "tee", codec::encode_blob("/full/f", b"x")).await;

    let (status, body) = call(&name.url, "rmdir", b"/full".to_vec()).await;
    assert_eq!(status.as_u16(), 400);
    assert!(String::from_utf8_lossy(&body).contains("not empty"));

    call_ok(&name.url, "rmdir", codec::encode_flagged_path("/full", true)).await;
    assert!(data.client().ls(Some("/")).await.unwrap().is_empty());
}

#[tokio::test]
async fn reads_fail_when_no_member_is_alive() {
    let name = spawn_name_node().await;

    let (status, body) = call(&name.url, "ls", b"/".to_vec()).await;
    assert_eq!(status.as_u16(), 400);
    assert!(String::from_utf8_lossy(&body).contains("no alive members"));
}

#[tokio::test]
async fn redirects_skip_unreachable_members() {
    let name = spawn_name_node().await;
    let first = spawn_data_node(Some(&name.url)).await;
    let second = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;

    second.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for _ in 0..5 {
        let redirect = String::from_utf8(call_ok(&name.url, "ls", Vec::new()).await).unwrap();
        assert_eq!(redirect, format!("{}ls", first.url));
    }
}

#[tokio::test]
async fn heartbeat_worker_runs_and_stops() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(Some(&name.url)).await;

    let worker = Heartbeat::spawn::<HttpDataNode>(name.db.clone(), Duration::from_millis(50));
    let mut went_alive = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if name.db.get(data.service.id()).unwrap().status == Status::Alive {
            went_alive = true;
            break;
        }
    }
    assert!(went_alive, "heartbeat never initialized the new member");
    worker.shutdown().await;
}

#[tokio::test]
async fn leave_namespace_marks_the_member_dead() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;

    call_ok(&data.url, "leave_namespace", Vec::new()).await;

    assert_eq!(name.db.get(data.service.id()).unwrap().status, Status::Dead);
    assert!(data.service.namenode_url().await.is_none());
}

#[tokio::test]
async fn data_node_identity_survives_restart() {
    use dfs_mamont::data_node::{Advertise, DataNodeService};

    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("root");

    let first = DataNodeService::open(&root, Advertise::default(), None).await.unwrap();
    let id = first.id().to_owned();
    drop(first);

    let second = DataNodeService::open(&root, Advertise::default(), None).await.unwrap();
    assert_eq!(second.id(), id);
}

#[tokio::test]
async fn add_node_registers_an_explicit_url() {
    let name = spawn_name_node().await;
    let data = spawn_data_node(None).await;

    call_ok(&name.url, "add_node", format!("{} xyz789", data.url).into_bytes()).await;
    assert_eq!(name.db.get("xyz789").unwrap().status, Status::New);

    heartbeat::tick::<HttpDataNode>(&name.db).await;
    assert_eq!(name.db.get("xyz789").unwrap().status, Status::Alive);
}

#[tokio::test]
async fn status_lists_every_member_with_its_state() {
    let name = spawn_name_node().await;
    let first = spawn_data_node(Some(&name.url)).await;
    heartbeat::tick::<HttpDataNode>(&name.db).await;
    let second = spawn_data_node(Some(&name.url)).await;

    let rows = codec::decode_matrix(&call_ok(&name.url, "status", Vec::new()).await).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], [first.service.id().to_owned(), "alive".to_owned()]);
    assert_eq!(rows[1], [second.service.id().to_owned(), "new".to_owned()]);
}
