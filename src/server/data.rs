//! Data-node endpoint handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use super::{reply, reply_as, GZIP};
use crate::codec;
use crate::data_node::DataNodeService;
use crate::error::Error;
use crate::node::DataNode;

type Service = Arc<DataNodeService>;

/// Builds the data-node handler registry.
pub fn data_node_router(service: Service) -> Router {
    Router::new()
        .route("/mkfs", get(mkfs).post(mkfs))
        .route("/df", get(df).post(df))
        .route("/cd", get(cd).post(cd))
        .route("/ls", get(ls).post(ls))
        .route("/mkdir", get(mkdir).post(mkdir))
        .route("/rmdir", get(rmdir).post(rmdir))
        .route("/touch", get(touch).post(touch))
        .route("/cat", get(cat).post(cat))
        .route("/tee", get(tee).post(tee))
        .route("/rm", get(rm).post(rm))
        .route("/stat", get(stat).post(stat))
        .route("/cp", get(cp).post(cp))
        .route("/mv", get(mv).post(mv))
        .route("/sync", get(sync).post(sync))
        .route("/snap", get(snap).post(snap))
        .route("/ping_alive", get(ping_alive).post(ping_alive))
        .route("/join_namespace", get(join_namespace).post(join_namespace))
        .route("/leave_namespace", get(leave_namespace).post(leave_namespace))
        .with_state(service)
}

async fn mkfs(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            service.mkfs().await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn df(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            Ok::<_, Error>(codec::encode_df(service.df().await?))
        }
        .await,
    )
}

async fn cd(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            service.cd(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn ls(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_optional_path(codec::decode(&body)?)?;
            let entries = service.ls(path.as_deref()).await?;
            Ok::<_, Error>(codec::encode_list(&entries))
        }
        .await,
    )
}

async fn mkdir(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            service.mkdir(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn rmdir(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let (path, force) = codec::as_flagged_path(codec::decode(&body)?)?;
            service.rmdir(&path, force).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn touch(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            service.touch(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn cat(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            service.cat(&path).await
        }
        .await,
    )
}

async fn tee(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let (path, data) = codec::as_blob(codec::decode(&body)?)?;
            service.tee(&path, &data).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn rm(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            service.rm(&path).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn stat(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let path = codec::as_path(codec::decode(&body)?)?;
            Ok::<_, Error>(codec::encode_stat(&service.stat(&path).await?))
        }
        .await,
    )
}

async fn cp(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let (src, dst) = codec::as_pair(codec::decode(&body)?)?;
            service.cp(&src, &dst).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn mv(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let (src, dst) = codec::as_pair(codec::decode(&body)?)?;
            service.mv(&src, &dst).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn sync(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let donor_url = codec::as_path(codec::decode(&body)?)?;
            service.sync(&donor_url).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn snap(State(service): State<Service>, body: Bytes) -> Response {
    reply_as(
        GZIP,
        async {
            codec::as_empty(codec::decode(&body)?)?;
            service.snap().await
        }
        .await,
    )
}

async fn ping_alive(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            service.ping_alive().await;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn join_namespace(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            let namenode_url = codec::as_path(codec::decode(&body)?)?;
            service.join_namespace(&namenode_url).await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}

async fn leave_namespace(State(service): State<Service>, body: Bytes) -> Response {
    reply(
        async {
            codec::as_empty(codec::decode(&body)?)?;
            service.leave_namespace().await?;
            Ok::<_, Error>(Vec::new())
        }
        .await,
    )
}
