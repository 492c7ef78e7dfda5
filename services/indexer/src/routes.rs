use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use ctree::{Address, ItemMetadata, ItemStore, State as TreeState, TreeError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::rediscover::RediscoverError;
use crate::state::SharedState;

const MAX_PAGE: u64 = 10_000;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Debug, Serialize)]
pub struct ItemView {
    pub index: u64,
    #[serde(flatten)]
    pub metadata: ItemMetadata,
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub from: u64,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<ItemView>,
    pub last_index: String,
    pub root: String,
}

pub async fn get_items(
    State(state): State<SharedState>,
    Query(q): Query<ItemsQuery>,
) -> ApiResult<ItemsResponse> {
    if q.count == 0 {
        return Err((StatusCode::BAD_REQUEST, "count must be positive".into()));
    }

    let confirmed = state.holder.confirmed();
    let mut items = Vec::new();

    if !confirmed.is_empty() && q.from <= confirmed.last_index {
        let count = q.count.min(MAX_PAGE).min(confirmed.last_index - q.from + 1);
        let slots = state
            .tree
            .items()
            .get_items(q.from, count)
            .await
            .map_err(internal)?;

        items = (q.from..)
            .zip(slots)
            .filter_map(|(index, slot)| slot.map(|metadata| ItemView { index, metadata }))
            .collect();
    }

    Ok(Json(ItemsResponse {
        items,
        last_index: confirmed.last_index.to_string(),
        root: confirmed.root.hash_hex(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ItemProofResponse {
    pub item: ItemView,
    pub root: String,
    /// Hex-encoded inclusion proof envelope
    pub proof: String,
}

pub async fn get_item(
    State(state): State<SharedState>,
    Path(index): Path<u64>,
) -> ApiResult<ItemProofResponse> {
    let confirmed = state.holder.confirmed();

    let (metadata, proof) = match state.tree.prove(&confirmed, index).await {
        Ok(found) => found,
        Err(TreeError::NotFound(i)) => {
            return Err((StatusCode::NOT_FOUND, format!("item {i} not found")))
        }
        Err(e) => {
            error!(index, "proof failed: {e}");
            return Err(internal(e));
        }
    };

    let envelope = proof.to_envelope().map_err(internal)?;

    Ok(Json(ItemProofResponse {
        item: ItemView { index, metadata },
        root: confirmed.root.hash_hex(),
        proof: hex::encode(envelope),
    }))
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub depth: u32,
    pub capacity: String,
    pub last_index: String,
    pub version: u64,
    pub root: String,
    pub address: Option<Address>,
}

pub async fn get_state(State(state): State<SharedState>) -> Json<StateResponse> {
    let confirmed = state.holder.confirmed();
    Json(StateResponse {
        depth: state.tree.depth(),
        capacity: state.tree.capacity().to_string(),
        last_index: confirmed.last_index.to_string(),
        version: confirmed.version,
        root: confirmed.root.hash_hex(),
        address: confirmed.address,
    })
}

pub async fn rediscover(State(state): State<SharedState>) -> ApiResult<TreeState> {
    match state.rediscoverer.rediscover().await {
        Ok(proposed) => Ok(Json(proposed)),
        Err(RediscoverError::NothingToRediscover) => Err((
            StatusCode::NOT_ACCEPTABLE,
            RediscoverError::NothingToRediscover.to_string(),
        )),
        Err(e) => {
            error!("rediscover failed: {e}");
            Err(internal(e))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub address: Address,
}

pub async fn set_address(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
) -> ApiResult<AddressResponse> {
    let address: Address = raw
        .parse()
        .map_err(|e: TreeError| (StatusCode::BAD_REQUEST, e.to_string()))?;

    state
        .addresses
        .send(address)
        .await
        .map_err(|_| internal("reconciliation loop is not running"))?;

    info!(%address, "admin: ledger address set");
    Ok(Json(AddressResponse { address }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use ctree::{InMemoryItemStore, InMemoryNodeStore, ItemStore, NodeStore};
    use tokio::sync::mpsc;

    use crate::config::AppConfig;
    use crate::rediscover::Rediscoverer;
    use crate::state::{AppState, StateHolder, Tree};
    use crate::updates::testing::MemoryRecorder;

    struct Fixture {
        state: SharedState,
        items: Arc<InMemoryItemStore>,
        proposals: mpsc::Receiver<TreeState>,
        addresses: mpsc::Receiver<Address>,
    }

    fn config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".into(),
            bind_addr: "127.0.0.1:0".into(),
            depth: 3,
            data_dir: PathBuf::from("/tmp"),
            ledger_api_url: "http://localhost".into(),
            ledger_timeout: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(1),
            admin_username: "admin".into(),
            admin_password: "admin".into(),
        }
    }

    fn fixture() -> Fixture {
        let items = Arc::new(InMemoryItemStore::new());
        let nodes: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
        let item_store: Arc<dyn ItemStore> = items.clone();
        let tree = Arc::new(Tree::new(3, nodes, item_store).unwrap());

        let holder = Arc::new(StateHolder::new(TreeState::empty(tree.empty_root())));
        let (proposals_tx, proposals) = mpsc::channel(16);
        let (addresses_tx, addresses) = mpsc::channel(16);
        let rediscoverer = Rediscoverer::new(
            tree.clone(),
            holder.clone(),
            Arc::new(MemoryRecorder::default()),
            proposals_tx,
        );

        let state = Arc::new(AppState {
            config: config(),
            tree,
            holder,
            rediscoverer,
            addresses: addresses_tx,
        });

        Fixture {
            state,
            items,
            proposals,
            addresses,
        }
    }

    fn owner() -> Address {
        Address::new(0, [0xab; 32]).unwrap()
    }

    /// Appends `count` items, rediscovers and confirms the proposal directly.
    async fn confirm(f: &mut Fixture, count: u8) -> TreeState {
        for i in 0..count {
            f.items
                .push(ItemMetadata::new(owner(), vec![i]))
                .unwrap();
        }
        let Json(proposed) = rediscover(State(f.state.clone())).await.unwrap();
        assert_eq!(f.proposals.recv().await.unwrap(), proposed);
        f.state.holder.set_confirmed(proposed.clone()).unwrap();
        proposed
    }

    #[tokio::test]
    async fn state_of_an_empty_tree() {
        let f = fixture();
        let Json(s) = get_state(State(f.state.clone())).await;
        assert_eq!(s.depth, 3);
        assert_eq!(s.capacity, "8");
        assert_eq!(s.version, 0);
        assert_eq!(s.root, f.state.tree.empty_root().hash_hex());
        assert!(s.address.is_none());
    }

    #[tokio::test]
    async fn rediscover_without_items_is_not_acceptable() {
        let f = fixture();
        let (status, _) = rediscover(State(f.state.clone())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn items_page_is_clipped_to_confirmed_state() {
        let mut f = fixture();
        confirm(&mut f, 3).await;
        // appended but not yet confirmed
        f.items.push(ItemMetadata::new(owner(), vec![9])).unwrap();

        let query = ItemsQuery { from: 1, count: 100 };
        let Json(page) = get_items(State(f.state.clone()), Query(query)).await.unwrap();
        let indices: Vec<u64> = page.items.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(page.last_index, "2");

        let query = ItemsQuery { from: 5, count: 1 };
        let Json(page) = get_items(State(f.state.clone()), Query(query)).await.unwrap();
        assert!(page.items.is_empty());

        let query = ItemsQuery { from: 0, count: 0 };
        let (status, _) = get_items(State(f.state.clone()), Query(query))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn item_proof_verifies_against_confirmed_root() {
        let mut f = fixture();
        let confirmed = confirm(&mut f, 5).await;

        let Json(resp) = get_item(State(f.state.clone()), Path(4)).await.unwrap();
        assert_eq!(resp.item.metadata.content, vec![4]);
        assert_eq!(resp.root, confirmed.root.hash_hex());

        let bytes = hex::decode(&resp.proof).unwrap();
        let proof = ctree::InclusionProof::from_envelope(&bytes).unwrap();
        assert!(proof.verify(&confirmed.root));

        let (status, _) = get_item(State(f.state.clone()), Path(5)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn address_is_forwarded_to_the_loop() {
        let mut f = fixture();
        let raw = owner().to_string();
        let Json(resp) = set_address(State(f.state.clone()), Path(raw)).await.unwrap();
        assert_eq!(resp.address, owner());
        assert_eq!(f.addresses.recv().await.unwrap(), owner());

        let (status, _) = set_address(State(f.state.clone()), Path("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    mod router {
        use super::*;
        use axum::body::Body;
        use axum::http::{header, Method, Request};
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        use tower::ServiceExt;

        async fn call(
            state: &SharedState,
            method: Method,
            uri: &str,
            auth: Option<&str>,
        ) -> StatusCode {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(creds) = auth {
                let value = format!("Basic {}", STANDARD.encode(creds));
                req = req.header(header::AUTHORIZATION, value);
            }
            crate::router(state.clone())
                .oneshot(req.body(Body::empty()).unwrap())
                .await
                .unwrap()
                .status()
        }

        #[tokio::test]
        async fn admin_requires_credentials() {
            let f = fixture();
            assert_eq!(
                call(&f.state, Method::POST, "/admin/rediscover", None).await,
                StatusCode::UNAUTHORIZED
            );
            assert_eq!(
                call(&f.state, Method::GET, "/admin/rediscover", Some("admin:wrong")).await,
                StatusCode::UNAUTHORIZED
            );
            assert_eq!(
                call(&f.state, Method::GET, "/v1/state", None).await,
                StatusCode::OK
            );
        }

        #[tokio::test]
        async fn admin_paths_accept_get_and_post() {
            let mut f = fixture();
            let auth = Some("admin:admin");

            for method in [Method::GET, Method::POST] {
                assert_eq!(
                    call(&f.state, method, "/admin/rediscover", auth).await,
                    StatusCode::NOT_ACCEPTABLE
                );
            }

            let addr = owner().to_string();
            assert_eq!(
                call(&f.state, Method::GET, &format!("/admin/setaddr/{addr}"), auth).await,
                StatusCode::OK
            );
            assert_eq!(
                call(&f.state, Method::POST, &format!("/admin/address/{addr}"), auth).await,
                StatusCode::OK
            );
            assert_eq!(f.addresses.recv().await.unwrap(), owner());
            assert_eq!(f.addresses.recv().await.unwrap(), owner());

            assert_eq!(
                call(&f.state, Method::GET, "/admin/setaddr/2:00", auth).await,
                StatusCode::BAD_REQUEST
            );
        }
    }
}
