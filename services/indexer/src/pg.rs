//! Postgres adapters for the node and item stores

use async_trait::async_trait;
use ctree::{Address, Hash32, ItemMetadata, ItemStore, Node, NodeStore, TreeError, Version};
use sqlx::PgPool;

fn storage(e: impl std::fmt::Display) -> TreeError {
    TreeError::Storage(e.to_string())
}

fn to_i64(value: u64) -> ctree::Result<i64> {
    i64::try_from(value).map_err(|_| TreeError::Storage(format!("{value} does not fit BIGINT")))
}

#[derive(Clone)]
pub struct PgNodeStore {
    pool: PgPool,
}

impl PgNodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeStore for PgNodeStore {
    async fn get_node(&self, index: u64, version: Version) -> ctree::Result<Option<Node>> {
        let row: Option<(Vec<u8>, i32)> = sqlx::query_as(
            r#"
            SELECT hash, depth
            FROM nodes
            WHERE index = $1 AND version <= $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(to_i64(index)?)
        .bind(to_i64(version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        let Some((hash, depth)) = row else {
            return Ok(None);
        };

        let hash: Hash32 = hash
            .as_slice()
            .try_into()
            .map_err(|_| TreeError::Storage(format!("node {index} has a {}-byte hash", hash.len())))?;
        let depth = u16::try_from(depth).map_err(storage)?;

        Ok(Some(Node::new(hash, depth)))
    }

    async fn set_node(&self, index: u64, version: Version, node: Node) -> ctree::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (index, version, hash, depth)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (index, version)
            DO UPDATE SET hash = EXCLUDED.hash, depth = EXCLUDED.depth
            "#,
        )
        .bind(to_i64(index)?)
        .bind(to_i64(version)?)
        .bind(&node.hash[..])
        .bind(i32::from(node.depth))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    owner: String,
    content: Vec<u8>,
}

impl ItemRow {
    fn into_metadata(self) -> ctree::Result<ItemMetadata> {
        let owner: Address = self.owner.parse()?;
        Ok(ItemMetadata::new(owner, self.content))
    }
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn get_item(&self, index: u64) -> ctree::Result<Option<ItemMetadata>> {
        let row: Option<ItemRow> =
            sqlx::query_as("SELECT id, owner, content FROM items WHERE id = $1")
                .bind(to_i64(index)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        row.map(ItemRow::into_metadata).transpose()
    }

    async fn get_items(&self, from: u64, count: u64) -> ctree::Result<Vec<Option<ItemMetadata>>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, owner, content
            FROM items
            WHERE id >= $1 AND id < $2
            ORDER BY id ASC
            "#,
        )
        .bind(to_i64(from)?)
        .bind(to_i64(from.saturating_add(count))?)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut slots: Vec<Option<ItemMetadata>> = Vec::with_capacity(rows.len());
        for row in rows {
            let offset = (row.id as u64 - from) as usize;
            slots.resize(offset, None);
            slots.push(Some(row.into_metadata()?));
        }
        slots.resize(count as usize, None);
        Ok(slots)
    }

    async fn count(&self) -> ctree::Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(count as u64)
    }
}
