use chrono::{DateTime, Utc};
use futures::FutureExt;
use sqlx::FromRow;
use tracing::{error, info};

use crate::db::ConnectionScope;
use crate::error::{StoreError, ValidationError};
use crate::timestamp::{self, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub name: String,
    pub body: String,
    pub created_at: Timestamp,
}

/// A comment that passed validation and may be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    name: String,
    body: String,
}

impl NewComment {
    pub fn new(name: &str, body: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        let body = body.trim();

        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }

        Ok(Self {
            name: name.to_string(),
            body: body.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: i64,
    name: String,
    comment: String,
    created_at: String,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        let created_at = timestamp::parse_stored(&row.created_at);
        if let Timestamp::Unknown(raw) = &created_at {
            error!(
                "Comment {} has an unreadable created_at value: {:?}",
                row.id, raw
            );
        }

        Comment {
            id: row.id,
            name: row.name,
            body: row.comment,
            created_at,
        }
    }
}

#[derive(Clone)]
pub struct CommentStore {
    scope: ConnectionScope,
}

impl CommentStore {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    pub fn is_configured(&self) -> bool {
        self.scope.is_configured()
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.scope
            .with_connection(|conn| {
                async move {
                    sqlx::query(
                        r#"
                        CREATE TABLE IF NOT EXISTS comments (
                            id INTEGER PRIMARY KEY AUTOINCREMENT,
                            name TEXT NOT NULL,
                            comment TEXT NOT NULL,
                            created_at TIMESTAMP NOT NULL
                        )
                        "#,
                    )
                    .execute(&mut *conn)
                    .await?;

                    sqlx::query(
                        r#"
                        CREATE INDEX IF NOT EXISTS idx_comments_created_at
                        ON comments(created_at DESC)
                        "#,
                    )
                    .execute(&mut *conn)
                    .await?;

                    Ok(())
                }
                .boxed()
            })
            .await
    }

    /// Store a comment stamped with the current time. Returns its id.
    pub async fn insert(&self, comment: &NewComment) -> Result<i64, StoreError> {
        self.insert_at(comment, Utc::now()).await
    }

    pub async fn insert_at(
        &self,
        comment: &NewComment,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let name = comment.name.clone();
        let body = comment.body.clone();
        let created_at = timestamp::to_storage(created_at);

        let id = self
            .scope
            .with_connection(|conn| {
                async move {
                    let result = sqlx::query(
                        "INSERT INTO comments (name, comment, created_at) VALUES (?, ?, ?)",
                    )
                    .bind(&name)
                    .bind(&body)
                    .bind(&created_at)
                    .execute(conn)
                    .await?;
                    Ok(result.last_insert_rowid())
                }
                .boxed()
            })
            .await?;

        info!("Stored comment {} from '{}'", id, comment.name);
        Ok(id)
    }

    /// All comments, newest first. Rows whose timestamp cannot be read are
    /// kept, carrying `Timestamp::Unknown`, after the readable ones.
    pub async fn list_all(&self) -> Result<Vec<Comment>, StoreError> {
        let rows = self
            .scope
            .with_connection(|conn| {
                async move {
                    sqlx::query_as::<_, CommentRow>(
                        r#"
                        SELECT id, name, comment, CAST(created_at AS TEXT) AS created_at
                        FROM comments
                        ORDER BY created_at DESC, id DESC
                        "#,
                    )
                    .fetch_all(conn)
                    .await
                }
                .boxed()
            })
            .await?;

        // Text order is only right when every row uses the same encoding.
        let mut comments: Vec<Comment> = rows.into_iter().map(Comment::from).collect();
        comments.sort_by(|a, b| {
            a.created_at
                .cmp_newest_first(&b.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(comments)
    }
}
