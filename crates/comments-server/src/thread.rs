use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use comments_shared::{Comment, CommentNode, SortField, SortOrder};
use futures::future::try_join_all;

use crate::error::AppError;
use crate::store::CommentStore;

#[derive(Debug, Clone, Copy)]
pub struct ThreadLimits {
    /// Deepest reply level below the requested comment.
    pub max_depth: usize,
    /// Upper bound for one whole `thread` call.
    pub timeout: Duration,
}

impl Default for ThreadLimits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Rebuilds reply trees from the flat comment table.
pub struct ThreadAssembler {
    store: Arc<dyn CommentStore>,
    limits: ThreadLimits,
}

impl ThreadAssembler {
    pub fn new(store: Arc<dyn CommentStore>, limits: ThreadLimits) -> Self {
        Self { store, limits }
    }

    /// Top-level comments without children. Unknown sort parameters fail
    /// before the store is queried; missing ones default to `date desc`.
    pub async fn top_level(
        &self,
        sort_by: Option<&str>,
        sort_order: Option<&str>,
    ) -> Result<Vec<Comment>, AppError> {
        let field = sort_by
            .map(str::parse::<SortField>)
            .transpose()?
            .unwrap_or_default();
        let order = sort_order
            .map(str::parse::<SortOrder>)
            .transpose()?
            .unwrap_or_default();

        Ok(self.store.top_level(field, order).await?)
    }

    /// The comment `id` with all of its descendants. Siblings are ordered by
    /// ascending id. Any store failure aborts the whole assembly.
    pub async fn thread(&self, id: i64) -> Result<CommentNode, AppError> {
        match tokio::time::timeout(self.limits.timeout, self.load(id)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout),
        }
    }

    async fn load(&self, id: i64) -> Result<CommentNode, AppError> {
        let root = self.store.get(id).await?.ok_or(AppError::NotFound)?;
        self.assemble(root, Vec::new()).await
    }

    /// `ancestors` is the path from the requested root down to `comment`'s parent.
    #[async_recursion]
    async fn assemble(
        &self,
        comment: Comment,
        ancestors: Vec<i64>,
    ) -> Result<CommentNode, AppError> {
        if ancestors.len() > self.limits.max_depth {
            return Err(AppError::DepthLimitExceeded(self.limits.max_depth));
        }

        let mut path = ancestors;
        path.push(comment.id);

        let children = self.store.children(comment.id).await?;
        let subtrees = children
            .into_iter()
            .filter(|child| {
                let revisited = path.contains(&child.id);
                if revisited {
                    tracing::warn!(id = child.id, parent = comment.id, "cycle in comment thread");
                }
                !revisited
            })
            .map(|child| self.assemble(child, path.clone()));

        let children = try_join_all(subtrees).await?;
        Ok(CommentNode { comment, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use crate::store::{NewComment, SqliteStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    async fn sqlite() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(create_memory_pool().await.unwrap()))
    }

    async fn add(store: &SqliteStore, name: &str, parent: Option<i64>) -> i64 {
        store
            .insert(NewComment {
                user_name: name.to_string(),
                email: format!("{name}@example.com"),
                home_page: None,
                text: name.to_string(),
                parent_comment_id: parent,
                attachment: None,
            })
            .await
            .unwrap()
            .id
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i64> {
        nodes.iter().map(CommentNode::id).collect()
    }

    #[tokio::test]
    async fn assembles_known_tree() {
        let store = sqlite().await;
        let a = add(&store, "A", None).await;
        let b = add(&store, "B", Some(a)).await;
        let c = add(&store, "C", Some(a)).await;
        let d = add(&store, "D", Some(b)).await;
        add(&store, "other", None).await;

        let assembler = ThreadAssembler::new(store, ThreadLimits::default());
        let tree = assembler.thread(a).await.unwrap();

        assert_eq!(tree.id(), a);
        assert_eq!(ids(&tree.children), vec![b, c]);
        assert_eq!(ids(&tree.children[0].children), vec![d]);
        assert!(tree.children[1].children.is_empty());
        assert!(tree.children[0].children[0].children.is_empty());
        assert_eq!(tree.len(), 4);
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let store = sqlite().await;
        let root = add(&store, "root", None).await;
        for i in 0..5 {
            let child = add(&store, &format!("c{i}"), Some(root)).await;
            add(&store, &format!("g{i}"), Some(child)).await;
        }

        let assembler = ThreadAssembler::new(store, ThreadLimits::default());
        let first = assembler.thread(root).await.unwrap();
        let second = assembler.thread(root).await.unwrap();
        assert_eq!(first, second);
        assert!(first.children.windows(2).all(|w| w[0].id() < w[1].id()));
    }

    #[tokio::test]
    async fn leaf_and_missing_comments() {
        let store = sqlite().await;
        let leaf = add(&store, "leaf", None).await;
        let assembler = ThreadAssembler::new(store, ThreadLimits::default());

        assert!(assembler.thread(leaf).await.unwrap().children.is_empty());
        assert!(matches!(assembler.thread(leaf + 1).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn dangling_parent_is_treated_as_absent() {
        let store = sqlite().await;
        let orphan = add(&store, "orphan", Some(9999)).await;
        let reply = add(&store, "reply", Some(orphan)).await;

        let assembler = ThreadAssembler::new(store, ThreadLimits::default());
        let tree = assembler.thread(orphan).await.unwrap();
        assert_eq!(ids(&tree.children), vec![reply]);
    }

    #[tokio::test]
    async fn top_level_validates_before_querying() {
        let assembler = ThreadAssembler::new(
            Arc::new(FixtureStore::failing_everything()),
            ThreadLimits::default(),
        );

        let err = assembler.top_level(Some("text"), None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSortParameter(_)));
        let err = assembler.top_level(None, Some("up")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSortParameter(_)));

        // Valid parameters reach the store, which fails here.
        let err = assembler.top_level(Some("email"), Some("asc")).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn top_level_defaults_to_newest_first() {
        let store = sqlite().await;
        let first = add(&store, "first", None).await;
        let second = add(&store, "second", None).await;
        add(&store, "reply", Some(first)).await;

        let assembler = ThreadAssembler::new(store, ThreadLimits::default());
        let newest_first = assembler.top_level(None, None).await.unwrap();
        assert_eq!(newest_first.iter().map(|c| c.id).collect::<Vec<_>>(), vec![second, first]);

        let oldest_first = assembler.top_level(Some("date"), Some("asc")).await.unwrap();
        assert!(oldest_first.windows(2).all(|w| w[0].date <= w[1].date));
    }

    /// In-memory store with injectable faults.
    #[derive(Default)]
    struct FixtureStore {
        comments: Vec<Comment>,
        fail_children_of: Option<i64>,
        fail_everything: bool,
        delay: Option<Duration>,
    }

    impl FixtureStore {
        fn failing_everything() -> Self {
            Self {
                fail_everything: true,
                ..Self::default()
            }
        }

        fn with(edges: &[(i64, Option<i64>)]) -> Self {
            let comments = edges
                .iter()
                .map(|&(id, parent)| Comment {
                    id,
                    user_name: format!("u{id}"),
                    email: format!("u{id}@example.com"),
                    home_page: None,
                    text: "t".into(),
                    parent_comment_id: parent,
                    date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    attachment: None,
                })
                .collect();
            Self {
                comments,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl CommentStore for FixtureStore {
        async fn insert(&self, _comment: NewComment) -> Result<Comment, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }

        async fn get(&self, id: i64) -> Result<Option<Comment>, sqlx::Error> {
            if self.fail_everything {
                return Err(sqlx::Error::PoolClosed);
            }
            Ok(self.comments.iter().find(|c| c.id == id).cloned())
        }

        async fn children(&self, parent_id: i64) -> Result<Vec<Comment>, sqlx::Error> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_everything || self.fail_children_of == Some(parent_id) {
                return Err(sqlx::Error::PoolTimedOut);
            }
            let mut children: Vec<Comment> = self
                .comments
                .iter()
                .filter(|c| c.parent_comment_id == Some(parent_id))
                .cloned()
                .collect();
            children.sort_by_key(|c| c.id);
            Ok(children)
        }

        async fn top_level(
            &self,
            _field: SortField,
            _order: SortOrder,
        ) -> Result<Vec<Comment>, sqlx::Error> {
            if self.fail_everything {
                return Err(sqlx::Error::PoolClosed);
            }
            Ok(self
                .comments
                .iter()
                .filter(|c| c.is_top_level())
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn deep_store_failure_aborts_assembly() {
        let store = FixtureStore {
            fail_children_of: Some(4),
            ..FixtureStore::with(&[(1, None), (2, Some(1)), (3, Some(1)), (4, Some(2))])
        };
        let assembler = ThreadAssembler::new(Arc::new(store), ThreadLimits::default());

        let err = assembler.thread(1).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn cycles_terminate() {
        // 1 -> 2 -> 3 -> 1, plus a self-referencing 4 under 3.
        let store = FixtureStore::with(&[(1, Some(3)), (2, Some(1)), (3, Some(2)), (4, Some(4))]);
        let assembler = ThreadAssembler::new(Arc::new(store), ThreadLimits::default());

        let tree = assembler.thread(1).await.unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.find(3).map(|n| n.children.len()), Some(0));

        let lone = assembler.thread(4).await.unwrap();
        assert!(lone.children.is_empty());
    }

    #[tokio::test]
    async fn depth_limit_is_enforced() {
        let edges: Vec<(i64, Option<i64>)> = (1..=6)
            .map(|id| (id, if id == 1 { None } else { Some(id - 1) }))
            .collect();
        let limits = |max_depth| ThreadLimits {
            max_depth,
            ..ThreadLimits::default()
        };

        let deep = ThreadAssembler::new(Arc::new(FixtureStore::with(&edges)), limits(5));
        assert_eq!(deep.thread(1).await.unwrap().len(), 6);

        let shallow = ThreadAssembler::new(Arc::new(FixtureStore::with(&edges)), limits(4));
        assert!(matches!(
            shallow.thread(1).await,
            Err(AppError::DepthLimitExceeded(4))
        ));
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = FixtureStore {
            delay: Some(Duration::from_secs(5)),
            ..FixtureStore::with(&[(1, None), (2, Some(1))])
        };
        let limits = ThreadLimits {
            timeout: Duration::from_millis(50),
            ..ThreadLimits::default()
        };
        let assembler = ThreadAssembler::new(Arc::new(store), limits);

        assert!(matches!(assembler.thread(1).await, Err(AppError::Timeout)));
    }
}
