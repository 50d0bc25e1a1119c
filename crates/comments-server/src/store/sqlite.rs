use async_trait::async_trait;
use chrono::Utc;
use comments_shared::{Comment, SortField, SortOrder};

use super::{CommentStore, NewComment};
use crate::db::DbPool;

const COLUMNS: &str = "id, user_name, email, home_page, text, parent_comment_id, date, attachment";

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommentStore for SqliteStore {
    async fn insert(&self, comment: NewComment) -> Result<Comment, sqlx::Error> {
        let now = Utc::now();

        let id = sqlx::query(
            r#"
            INSERT INTO comments (user_name, email, home_page, text, parent_comment_id, date, attachment)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.user_name)
        .bind(&comment.email)
        .bind(&comment.home_page)
        .bind(&comment.text)
        .bind(comment.parent_comment_id)
        .bind(now)
        .bind(&comment.attachment)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(Comment {
            id,
            user_name: comment.user_name,
            email: comment.email,
            home_page: comment.home_page,
            text: comment.text,
            parent_comment_id: comment.parent_comment_id,
            date: now,
            attachment: comment.attachment,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM comments WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    async fn children(&self, parent_id: i64) -> Result<Vec<Comment>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM comments WHERE parent_comment_id = ? ORDER BY id ASC"
        ))
        .bind(parent_id)
        .fetch_all(&self.db)
        .await
    }

    async fn top_level(
        &self,
        field: SortField,
        order: SortOrder,
    ) -> Result<Vec<Comment>, sqlx::Error> {
        // Both fragments come from closed enums, never from request text.
        let query = format!(
            r#"
            SELECT {COLUMNS}
            FROM comments
            WHERE parent_comment_id IS NULL
            ORDER BY {} {}, id ASC
            "#,
            field.column(),
            order.sql()
        );

        sqlx::query_as(&query).fetch_all(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn new_comment(user_name: &str, parent: Option<i64>) -> NewComment {
        NewComment {
            user_name: user_name.to_string(),
            email: format!("{user_name}@example.com"),
            home_page: None,
            text: "text".to_string(),
            parent_comment_id: parent,
            attachment: None,
        }
    }

    async fn store() -> SqliteStore {
        SqliteStore::new(create_memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = store().await;
        let a = store.insert(new_comment("a", None)).await.unwrap();
        let b = store.insert(new_comment("b", Some(a.id))).await.unwrap();

        assert!(b.id > a.id);
        let stored = store.get(b.id).await.unwrap().unwrap();
        assert_eq!(stored.user_name, "b");
        assert_eq!(stored.parent_comment_id, Some(a.id));
        assert_eq!(store.get(b.id + 100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn children_are_direct_replies_only() {
        let store = store().await;
        let root = store.insert(new_comment("root", None)).await.unwrap();
        let first = store.insert(new_comment("first", Some(root.id))).await.unwrap();
        let second = store.insert(new_comment("second", Some(root.id))).await.unwrap();
        store.insert(new_comment("nested", Some(first.id))).await.unwrap();

        let ids: Vec<i64> = store
            .children(root.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(store.children(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_level_sorts_with_id_tiebreak() {
        let store = store().await;
        let b1 = store.insert(new_comment("bob", None)).await.unwrap();
        let a = store.insert(new_comment("alice", None)).await.unwrap();
        let b2 = store.insert(new_comment("bob", None)).await.unwrap();
        store.insert(new_comment("reply", Some(a.id))).await.unwrap();

        let asc: Vec<i64> = store
            .top_level(SortField::UserName, SortOrder::Asc)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(asc, vec![a.id, b1.id, b2.id]);

        let desc: Vec<i64> = store
            .top_level(SortField::UserName, SortOrder::Desc)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(desc, vec![b1.id, b2.id, a.id]);
    }

    #[tokio::test]
    async fn top_level_by_date_is_chronological() {
        let store = store().await;
        for name in ["one", "two", "three"] {
            store.insert(new_comment(name, None)).await.unwrap();
        }

        let comments = store
            .top_level(SortField::Date, SortOrder::Asc)
            .await
            .unwrap();
        assert_eq!(comments.len(), 3);
        assert!(comments.windows(2).all(|w| w[0].date <= w[1].date));
    }
}
