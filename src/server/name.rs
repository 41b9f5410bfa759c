//! Name-node endpoint handlers.
//!
//! The router is generic over the member client, like the dispatcher it
//! fronts. `/nodes/join` is the one place the TCP source address matters:
//! a handshake without an explicit host stores a callback URL built from the
//! peer address of the request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::reply;
use crate::codec;
use crate::error::Error;
use crate::name_node::NameNode;
use crate::node::Connect;

/// Builds the name-node handler registry.
pub fn name_node_router<C: Connect>(node: Arc<NameNode<C>>) -> Router {
    Router::new()
        .route("/mkfs", get(mkfs::<C>).post(mkfs::<C>))
        .route("/df", get(df::<C>).post(df::<C>))
        .route("/status", get(status::<C>).post(status::<C>))
        .route("/cd", get(cd::<C>).post(cd::<C>))
        .route("/ls", get(ls::<C>).post(ls::<C>))
        .route("/mkdir", get(mkdir::<C>).post(mkdir::<C>))
        .route("/rmdir", get(rmdir::<C>).post(rmdir::<C>))
        .route("/touch", get(touch::<C>).post(touch::<C>))
        .route("/cat", get(cat::<C>).post(cat::<C>))
        .route("/tee", get(tee::<C>).post(tee::<C>))
        .route("/rm", get(rm::<C>).post(rm::<C>))
        .route("/stat", get(stat::<C>).post(stat::<C>))
        .route("/cp", get(cp::<C>).post(cp::<C>))
        .route("/mv", get(mv::<C>).post(mv::<C>))
        .route("/ping_alive", get(ping_alive::<C>).post(ping_alive::<C>))
        .route("/add_node", get(add_node::<C>).post(add_node::<C>))
        .route("/nodes/join", get(join::<C>).post(join::<C>))
        .route("/nodes/leave", get(leave::<C>).post(leave::<C>))
        .with_state(node)
}

async fn mkfs<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            node.mkfs().await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn df<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            Ok::<_, Error>(codec::encode_matrix(&node.df().await?))
        }
        .await,
    )
}

async fn status<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            Ok::<_, Error>(codec::encode_matrix(&node.status()))
        }
        .await,
    )
}

async fn cd<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            node.cd(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

// The read redirects accept the path the client will replay against the
// replica, but only the replica interprets it.

async fn ls<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_optional_path(codec::decode(&body)?)?;
            Ok::<_, Error>(node.ls().await?.into_bytes())
        }
        .await,
    )
}

async fn cat<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_path(codec::decode(&body)?)?;
            Ok::<_, Error>(node.cat().await?.into_bytes())
        }
        .await,
    )
}

async fn stat<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_path(codec::decode(&body)?)?;
            Ok::<_, Error>(node.stat().await?.into_bytes())
        }
        .await,
    )
}

async fn mkdir<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            node.mkdir(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn rmdir<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let (path, force) = codec::as_flagged_path(codec::decode(&body)?)?;
            node.rmdir(&path, force).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn touch<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            node.touch(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn tee<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let (path, data) = codec::as_blob(codec::decode(&body)?)?;
            node.tee(&path, &data).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn rm<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            node.rm(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn cp<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let (src, dst) = codec::as_pair(codec::decode(&body)?)?;
            node.cp(&src, &dst).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn mv<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let (src, dst) = codec::as_pair(codec::decode(&body)?)?;
            node.mv(&src, &dst).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn ping_alive<C: Connect>(State(_node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(codec::decode(&body).and_then(codec::as_empty).map(|()| Vec::new()))
}

async fn add_node<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let (public_url, url, id) = codec::decode_add_node(&body)?;
            node.add_node(public_url.as_deref(), &url, &id)?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn join<C: Connect>(
    State(node): State<Arc<NameNode<C>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    reply(
        async {
            let (public_url, url, id) = codec::decode_join(&body, peer.ip())?;
            node.add_node(public_url.as_deref(), &url, &id)?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn leave<C: Connect>(State(node): State<Arc<NameNode<C>>>, body: Bytes) -> Response {
    reply(
        async {
            let id = codec::as_path(codec::decode(&body)?)?;
            node.exclude_node(&id)?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}
