//! Database repository for CRUD operations.
//!
//! Uses prepared statements throughout; every multi-statement invariant
//! (position renumbering, membership toggles, parent/child backreferences,
//! cascade deletes) runs inside a transaction so no request can observe a
//! half-applied write.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    AdminVerification, AuthorInfo, BulkUpdateResult, ChatMessage, ChatMessageView, Comment,
    CommentView, CreatePostRequest, CreateTodoRequest, Post, PostView, Priority,
    PriorityBreakdown, RegistrationDay, Role, SignupRequest, Todo, TodoStats,
    UpdatePostRequest, UpdateProfileRequest, UpdateTodoRequest, User, UserStats,
};
use crate::pagination::PageParams;

/// Post listing scope.
#[derive(Debug, Clone, Copy)]
pub enum PostScope<'a> {
    All,
    SavedBy(&'a str),
    ByAuthor(&'a str),
}

/// Membership set fields on a post that can be toggled.
#[derive(Debug, Clone, Copy)]
pub enum ToggleField {
    Likes,
    Saves,
}

impl ToggleField {
    fn column(&self) -> &'static str {
        match self {
            ToggleField::Likes => "likes",
            ToggleField::Saves => "saves",
        }
    }
}

// Sort-key whitelists: caller-supplied sort keys are mapped to concrete
// columns, everything unknown falls back to the default.

fn post_sort_column(key: &str) -> &'static str {
    match key {
        "updatedAt" => "updated_at",
        _ => "created_at",
    }
}

fn comment_sort_column(key: &str) -> &'static str {
    match key {
        "updatedAt" => "updated_at",
        _ => "created_at",
    }
}

fn chat_sort_column(key: &str) -> &'static str {
    match key {
        "likes" => "likes",
        "updatedAt" => "updated_at",
        _ => "created_at",
    }
}

fn todo_sort_column(key: &str) -> &'static str {
    match key {
        "createdAt" => "created_at",
        "updatedAt" => "updated_at",
        "dueDate" => "due_date",
        "priority" => "priority",
        "title" => "title",
        _ => "position",
    }
}

fn user_sort_column(key: &str) -> &'static str {
    match key {
        "username" => "username",
        "email" => "email",
        "updatedAt" => "updated_at",
        _ => "created_at",
    }
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Create a new user account. The password must already be hashed.
    pub async fn create_user(
        &self,
        request: &SignupRequest,
        password_hash: &str,
        role: Role,
        is_verified: bool,
    ) -> Result<User, AppError> {
        let existing =
            sqlx::query("SELECT id FROM users WHERE email = ? OR username = ? LIMIT 1")
                .bind(&request.email)
                .bind(&request.username)
                .fetch_optional(&self.pool)
                .await?;

        if existing.is_some() {
            return Err(AppError::Validation(
                "User with this email or username already exists".to_string(),
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let bio = request.bio.clone().unwrap_or_default();

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, bio, avatar, role, is_verified, created_at, updated_at) VALUES (?, ?, ?, ?, ?, NULL, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(password_hash)
        .bind(&bio)
        .bind(role.as_str())
        .bind(is_verified as i32)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            username: request.username.clone(),
            email: request.email.clone(),
            password_hash: password_hash.to_string(),
            bio,
            avatar: None,
            role,
            is_verified,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, bio, avatar, role, is_verified, created_at, updated_at FROM users WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user by email, optionally restricted to a role.
    pub async fn get_user_by_email(
        &self,
        email: &str,
        role: Option<Role>,
    ) -> Result<Option<User>, AppError> {
        let row = match role {
            Some(role) => {
                sqlx::query(
                    "SELECT id, username, email, password_hash, bio, avatar, role, is_verified, created_at, updated_at FROM users WHERE email = ? AND role = ?"
                )
                .bind(email)
                .bind(role.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, username, email, password_hash, bio, avatar, role, is_verified, created_at, updated_at FROM users WHERE email = ?"
                )
                .bind(email)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row.as_ref().map(user_from_row))
    }

    /// Update the caller's profile fields.
    pub async fn update_profile(
        &self,
        id: &str,
        request: &UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(username) = &request.username {
            let taken = sqlx::query("SELECT id FROM users WHERE username = ? AND id != ?")
                .bind(username)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            if taken.is_some() {
                return Err(AppError::Validation(
                    "Username is already taken".to_string(),
                ));
            }
        }

        let username = request.username.clone().unwrap_or(existing.username);
        let bio = request.bio.clone().unwrap_or(existing.bio);
        let avatar = request.avatar.clone().or(existing.avatar);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE users SET username = ?, bio = ?, avatar = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&username)
        .bind(&bio)
        .bind(&avatar)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: id.to_string(),
            username,
            email: existing.email,
            password_hash: existing.password_hash,
            bio,
            avatar,
            role: existing.role,
            is_verified: existing.is_verified,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// List users with optional role filter and username/email search.
    pub async fn list_users(
        &self,
        params: &PageParams,
        role: Option<&str>,
        search: Option<&str>,
    ) -> Result<(Vec<User>, i64), AppError> {
        let mut sql = String::from(
            "SELECT id, username, email, password_hash, bio, avatar, role, is_verified, created_at, updated_at FROM users WHERE 1 = 1"
        );
        let mut count_sql = String::from("SELECT COUNT(*) AS total FROM users WHERE 1 = 1");

        if role.is_some() {
            sql.push_str(" AND role = ?");
            count_sql.push_str(" AND role = ?");
        }
        if search.is_some() {
            sql.push_str(" AND (username LIKE ? OR email LIKE ?)");
            count_sql.push_str(" AND (username LIKE ? OR email LIKE ?)");
        }
        sql.push_str(&format!(
            " ORDER BY {} {} LIMIT ? OFFSET ?",
            user_sort_column(&params.sort),
            params.order.as_sql()
        ));

        let pattern = search.map(|s| format!("%{}%", s));

        let mut query = sqlx::query(&sql);
        let mut count_query = sqlx::query(&count_sql);
        if let Some(role) = role {
            query = query.bind(role.to_string());
            count_query = count_query.bind(role.to_string());
        }
        if let Some(pattern) = &pattern {
            query = query.bind(pattern).bind(pattern);
            count_query = count_query.bind(pattern).bind(pattern);
        }

        let rows = query
            .bind(params.limit)
            .bind(params.skip())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = count_query.fetch_one(&self.pool).await?.get("total");

        Ok((rows.iter().map(user_from_row).collect(), total))
    }

    /// Change a user's role.
    pub async fn update_user_role(&self, id: &str, role: Role) -> Result<User, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Flip a user's verification status, returning the updated record.
    pub async fn toggle_user_status(&self, id: &str) -> Result<User, AppError> {
        let user = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE users SET is_verified = ?, updated_at = ? WHERE id = ?")
            .bind(!user.is_verified as i32)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(User {
            is_verified: !user.is_verified,
            updated_at: now,
            ..user
        })
    }

    /// Delete a user together with their posts and those posts' comments.
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM comments WHERE post_id IN (SELECT id FROM posts WHERE author_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM posts WHERE author_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Number of posts authored by a user.
    pub async fn user_post_count(&self, id: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM posts WHERE author_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Platform statistics for the admin dashboard.
    pub async fn get_user_stats(&self) -> Result<UserStats, AppError> {
        let now = Utc::now();
        let thirty_days_ago = (now - chrono::Duration::days(30)).to_rfc3339();
        let seven_days_ago = (now - chrono::Duration::days(7)).to_rfc3339();

        let total_users: i64 = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&self.pool)
            .await?
            .get("total");
        let active_users: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM users WHERE is_verified = 1")
                .fetch_one(&self.pool)
                .await?
                .get("total");
        let admin_users: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM users WHERE role = 'admin'")
                .fetch_one(&self.pool)
                .await?
                .get("total");
        let total_posts: i64 = sqlx::query("SELECT COUNT(*) AS total FROM posts")
            .fetch_one(&self.pool)
            .await?
            .get("total");
        let recent_users: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM users WHERE created_at >= ?")
                .bind(&thirty_days_ago)
                .fetch_one(&self.pool)
                .await?
                .get("total");

        let trend_rows = sqlx::query(
            "SELECT date(created_at) AS day, COUNT(*) AS count FROM users WHERE created_at >= ? GROUP BY day ORDER BY day"
        )
        .bind(&seven_days_ago)
        .fetch_all(&self.pool)
        .await?;

        let registration_trend = trend_rows
            .into_iter()
            .map(|row| RegistrationDay {
                date: row.get("day"),
                count: row.get("count"),
            })
            .collect();

        Ok(UserStats {
            total_users,
            active_users,
            admin_users,
            total_posts,
            recent_users,
            registration_trend,
        })
    }

    // ==================== ADMIN VERIFICATION ====================

    /// Generate a single-use admin verification string valid for 24 hours.
    pub async fn create_admin_verification(
        &self,
        created_by: &str,
    ) -> Result<AdminVerification, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let verification_string = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = (now + chrono::Duration::hours(24)).to_rfc3339();

        sqlx::query(
            "INSERT INTO admin_verifications (id, verification_string, is_used, created_by, used_by, expires_at, created_at) VALUES (?, ?, 0, ?, NULL, ?, ?)"
        )
        .bind(&id)
        .bind(&verification_string)
        .bind(created_by)
        .bind(&expires_at)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AdminVerification {
            verification_string,
            expires_at,
        })
    }

    /// Look up an unused, unexpired verification string.
    pub async fn find_valid_verification(
        &self,
        verification_string: &str,
    ) -> Result<Option<String>, AppError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "SELECT id FROM admin_verifications WHERE verification_string = ? AND is_used = 0 AND expires_at > ?"
        )
        .bind(verification_string)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Burn a verification string after a successful admin signup.
    pub async fn mark_verification_used(
        &self,
        verification_id: &str,
        used_by: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE admin_verifications SET is_used = 1, used_by = ? WHERE id = ?")
            .bind(used_by)
            .bind(verification_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== POST OPERATIONS ====================

    /// List posts for a scope, shaped for the viewer.
    pub async fn list_posts(
        &self,
        params: &PageParams,
        scope: PostScope<'_>,
        viewer: Option<&str>,
    ) -> Result<(Vec<PostView>, i64), AppError> {
        let base = "SELECT id, author_id, content, image_url, link_url, likes, saves, comments, created_at, updated_at FROM posts";
        let (filter, bind): (&str, Option<&str>) = match scope {
            PostScope::All => ("", None),
            PostScope::SavedBy(user) => (
                " WHERE EXISTS (SELECT 1 FROM json_each(posts.saves) WHERE json_each.value = ?)",
                Some(user),
            ),
            PostScope::ByAuthor(author) => (" WHERE author_id = ?", Some(author)),
        };

        let sql = format!(
            "{}{} ORDER BY {} {} LIMIT ? OFFSET ?",
            base,
            filter,
            post_sort_column(&params.sort),
            params.order.as_sql()
        );
        let count_sql = format!("SELECT COUNT(*) AS total FROM posts{}", filter);

        let mut query = sqlx::query(&sql);
        let mut count_query = sqlx::query(&count_sql);
        if let Some(value) = bind {
            query = query.bind(value.to_string());
            count_query = count_query.bind(value.to_string());
        }

        let rows = query
            .bind(params.limit)
            .bind(params.skip())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = count_query.fetch_one(&self.pool).await?.get("total");

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let post = post_from_row(row);
            views.push(self.shape_post(post, viewer).await?);
        }

        Ok((views, total))
    }

    /// Get a raw post by ID.
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let row = sqlx::query(
            "SELECT id, author_id, content, image_url, link_url, likes, saves, comments, created_at, updated_at FROM posts WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Shape a post for the viewer: author projection, interaction flags and
    /// the 3 most recent comments.
    pub async fn shape_post(
        &self,
        post: Post,
        viewer: Option<&str>,
    ) -> Result<PostView, AppError> {
        let author = self.get_author_info(&post.author_id).await?;

        let comment_rows = sqlx::query(
            "SELECT id, post_id, author_id, content, created_at, updated_at FROM comments WHERE post_id = ? ORDER BY created_at DESC LIMIT 3"
        )
        .bind(&post.id)
        .fetch_all(&self.pool)
        .await?;

        let mut recent_comments = Vec::with_capacity(comment_rows.len());
        for row in &comment_rows {
            let comment = comment_from_row(row);
            let author = self.get_author_info(&comment.author_id).await?;
            recent_comments.push(CommentView::new(comment, author));
        }

        Ok(PostView::new(post, author, recent_comments, viewer))
    }

    /// Create a new post.
    pub async fn create_post(
        &self,
        author_id: &str,
        request: &CreatePostRequest,
    ) -> Result<Post, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO posts (id, author_id, content, image_url, link_url, likes, saves, comments, created_at, updated_at) VALUES (?, ?, ?, ?, ?, '[]', '[]', '[]', ?, ?)"
        )
        .bind(&id)
        .bind(author_id)
        .bind(&request.content)
        .bind(&request.image_url)
        .bind(&request.link_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id,
            author_id: author_id.to_string(),
            content: request.content.clone(),
            image_url: request.image_url.clone(),
            link_url: request.link_url.clone(),
            likes: vec![],
            saves: vec![],
            comments: vec![],
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Update a post's content fields.
    pub async fn update_post(
        &self,
        id: &str,
        request: &UpdatePostRequest,
    ) -> Result<Post, AppError> {
        let existing = self
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        let content = request.content.clone().unwrap_or(existing.content);
        let image_url = request.image_url.clone().or(existing.image_url);
        let link_url = request.link_url.clone().or(existing.link_url);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE posts SET content = ?, image_url = ?, link_url = ?, updated_at = ? WHERE id = ?"
        )
        .bind(&content)
        .bind(&image_url)
        .bind(&link_url)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Post {
            content,
            image_url,
            link_url,
            updated_at: now,
            ..existing
        })
    }

    /// Delete a post and cascade to its comments. Children go first.
    pub async fn delete_post(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Toggle a user's membership in a post's likes or saves set.
    ///
    /// The direction is derived purely from current membership, read and
    /// written in one transaction. Returns the new membership state and the
    /// resulting set size.
    pub async fn toggle_membership(
        &self,
        post_id: &str,
        user_id: &str,
        field: ToggleField,
    ) -> Result<(bool, usize), AppError> {
        let column = field.column();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", column))
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        let stored: String = row.get(column);
        let mut members = parse_json_array(&stored);

        let is_member = if let Some(index) = members.iter().position(|m| m == user_id) {
            members.remove(index);
            false
        } else {
            members.push(user_id.to_string());
            true
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query(&format!(
            "UPDATE posts SET {} = ?, updated_at = ? WHERE id = ?",
            column
        ))
        .bind(serde_json::to_string(&members)?)
        .bind(&now)
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((is_member, members.len()))
    }

    // ==================== COMMENT OPERATIONS ====================

    /// Add a comment to a post and append it to the post's comment list.
    pub async fn add_comment(
        &self,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<CommentView, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT comments FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(post_id)
        .bind(author_id)
        .bind(content)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let stored: String = row.get("comments");
        let mut comment_ids = parse_json_array(&stored);
        comment_ids.push(id.clone());

        sqlx::query("UPDATE posts SET comments = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&comment_ids)?)
            .bind(&now)
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let comment = Comment {
            id,
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        let author = self.get_author_info(author_id).await?;
        Ok(CommentView::new(comment, author))
    }

    /// List a post's comments.
    pub async fn list_comments(
        &self,
        post_id: &str,
        params: &PageParams,
    ) -> Result<(Vec<CommentView>, i64), AppError> {
        let sql = format!(
            "SELECT id, post_id, author_id, content, created_at, updated_at FROM comments WHERE post_id = ? ORDER BY {} {} LIMIT ? OFFSET ?",
            comment_sort_column(&params.sort),
            params.order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(post_id)
            .bind(params.limit)
            .bind(params.skip())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM comments WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let comment = comment_from_row(row);
            let author = self.get_author_info(&comment.author_id).await?;
            views.push(CommentView::new(comment, author));
        }

        Ok((views, total))
    }

    /// Get a comment by ID.
    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let row = sqlx::query(
            "SELECT id, post_id, author_id, content, created_at, updated_at FROM comments WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Delete a comment, pulling it from the parent post's list first.
    ///
    /// The pull is best-effort: a concurrently deleted parent is a no-op, not
    /// an error.
    pub async fn delete_comment(&self, comment: &Comment) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(row) = sqlx::query("SELECT comments FROM posts WHERE id = ?")
            .bind(&comment.post_id)
            .fetch_optional(&mut *tx)
            .await?
        {
            let stored: String = row.get("comments");
            let mut comment_ids = parse_json_array(&stored);
            comment_ids.retain(|c| c != &comment.id);

            sqlx::query("UPDATE posts SET comments = ? WHERE id = ?")
                .bind(serde_json::to_string(&comment_ids)?)
                .bind(&comment.post_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(&comment.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== CHAT OPERATIONS ====================

    /// List top-level messages with up to 5 oldest replies inlined.
    pub async fn list_messages(
        &self,
        params: &PageParams,
    ) -> Result<(Vec<ChatMessageView>, i64), AppError> {
        let sql = format!(
            "SELECT id, content, author_id, is_anonymous, parent_id, replies, likes, created_at, updated_at FROM chat_messages WHERE parent_id IS NULL ORDER BY {} {} LIMIT ? OFFSET ?",
            chat_sort_column(&params.sort),
            params.order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(params.limit)
            .bind(params.skip())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM chat_messages WHERE parent_id IS NULL")
                .fetch_one(&self.pool)
                .await?
                .get("total");

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let message = message_from_row(row);
            views.push(self.shape_message_with_replies(message).await?);
        }

        Ok((views, total))
    }

    /// Get a raw chat message by ID.
    pub async fn get_message(&self, id: &str) -> Result<Option<ChatMessage>, AppError> {
        let row = sqlx::query(
            "SELECT id, content, author_id, is_anonymous, parent_id, replies, likes, created_at, updated_at FROM chat_messages WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(message_from_row))
    }

    /// Shape a message for callers, without inline replies.
    pub async fn shape_message(
        &self,
        message: ChatMessage,
    ) -> Result<ChatMessageView, AppError> {
        let author = match &message.author_id {
            Some(id) => self.get_author_info(id).await?,
            None => None,
        };
        Ok(ChatMessageView::new(message, author, vec![]))
    }

    /// Shape a message with its 5 oldest replies inlined.
    async fn shape_message_with_replies(
        &self,
        message: ChatMessage,
    ) -> Result<ChatMessageView, AppError> {
        let reply_rows = sqlx::query(
            "SELECT id, content, author_id, is_anonymous, parent_id, replies, likes, created_at, updated_at FROM chat_messages WHERE parent_id = ? ORDER BY created_at ASC LIMIT 5"
        )
        .bind(&message.id)
        .fetch_all(&self.pool)
        .await?;

        let mut replies = Vec::with_capacity(reply_rows.len());
        for row in &reply_rows {
            let reply = message_from_row(row);
            replies.push(self.shape_message(reply).await?);
        }

        let author = match &message.author_id {
            Some(id) => self.get_author_info(id).await?,
            None => None,
        };
        Ok(ChatMessageView::new(message, author, replies))
    }

    /// Persist a message. A reply is also appended to its parent's list; both
    /// writes share one transaction.
    pub async fn create_message(
        &self,
        content: &str,
        author_id: Option<&str>,
        is_anonymous: bool,
        parent_id: Option<&str>,
    ) -> Result<ChatMessage, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chat_messages (id, content, author_id, is_anonymous, parent_id, replies, likes, created_at, updated_at) VALUES (?, ?, ?, ?, ?, '[]', 0, ?, ?)"
        )
        .bind(&id)
        .bind(content)
        .bind(author_id)
        .bind(is_anonymous as i32)
        .bind(parent_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if let Some(parent_id) = parent_id {
            let row = sqlx::query("SELECT replies FROM chat_messages WHERE id = ?")
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Parent message not found".to_string()))?;

            let stored: String = row.get("replies");
            let mut reply_ids = parse_json_array(&stored);
            reply_ids.push(id.clone());

            sqlx::query("UPDATE chat_messages SET replies = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(&reply_ids)?)
                .bind(&now)
                .bind(parent_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(ChatMessage {
            id,
            content: content.to_string(),
            author_id: author_id.map(String::from),
            is_anonymous,
            parent_id: parent_id.map(String::from),
            replies: vec![],
            likes: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Increment a message's like counter.
    ///
    /// Deliberately a bare counter: repeated likes from the same caller count
    /// again.
    pub async fn like_message(&self, id: &str) -> Result<i64, AppError> {
        let result = sqlx::query("UPDATE chat_messages SET likes = likes + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Message not found".to_string()));
        }

        let row = sqlx::query("SELECT likes FROM chat_messages WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("likes"))
    }

    /// Delete a message: pull it from its parent's reply list if it is a
    /// reply, then cascade-delete its own replies, then the message itself.
    pub async fn delete_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(parent_id) = &message.parent_id {
            if let Some(row) = sqlx::query("SELECT replies FROM chat_messages WHERE id = ?")
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?
            {
                let stored: String = row.get("replies");
                let mut reply_ids = parse_json_array(&stored);
                reply_ids.retain(|r| r != &message.id);

                sqlx::query("UPDATE chat_messages SET replies = ? WHERE id = ?")
                    .bind(serde_json::to_string(&reply_ids)?)
                    .bind(parent_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("DELETE FROM chat_messages WHERE parent_id = ?")
            .bind(&message.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_messages WHERE id = ?")
            .bind(&message.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// List a message's replies.
    pub async fn list_replies(
        &self,
        parent_id: &str,
        params: &PageParams,
    ) -> Result<(Vec<ChatMessageView>, i64), AppError> {
        let sql = format!(
            "SELECT id, content, author_id, is_anonymous, parent_id, replies, likes, created_at, updated_at FROM chat_messages WHERE parent_id = ? ORDER BY {} {} LIMIT ? OFFSET ?",
            chat_sort_column(&params.sort),
            params.order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .bind(params.limit)
            .bind(params.skip())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM chat_messages WHERE parent_id = ?")
                .bind(parent_id)
                .fetch_one(&self.pool)
                .await?
                .get("total");

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let reply = message_from_row(row);
            views.push(self.shape_message(reply).await?);
        }

        Ok((views, total))
    }

    // ==================== TODO OPERATIONS ====================

    /// List an owner's todos with optional filters.
    pub async fn list_todos(
        &self,
        user_id: &str,
        params: &PageParams,
        completed: Option<bool>,
        priority: Option<Priority>,
        due_before: Option<&str>,
    ) -> Result<(Vec<Todo>, i64), AppError> {
        let mut sql = String::from(
            "SELECT id, user_id, title, content, completed, priority, due_date, tags, position, created_at, updated_at FROM todos WHERE user_id = ?"
        );
        let mut count_sql = String::from("SELECT COUNT(*) AS total FROM todos WHERE user_id = ?");

        let mut filters = String::new();
        if completed.is_some() {
            filters.push_str(" AND completed = ?");
        }
        if priority.is_some() {
            filters.push_str(" AND priority = ?");
        }
        if due_before.is_some() {
            filters.push_str(" AND due_date IS NOT NULL AND due_date <= ?");
        }
        sql.push_str(&filters);
        count_sql.push_str(&filters);
        sql.push_str(&format!(
            " ORDER BY {} {} LIMIT ? OFFSET ?",
            todo_sort_column(&params.sort),
            params.order.as_sql()
        ));

        let mut query = sqlx::query(&sql).bind(user_id);
        let mut count_query = sqlx::query(&count_sql).bind(user_id);
        if let Some(completed) = completed {
            query = query.bind(completed as i32);
            count_query = count_query.bind(completed as i32);
        }
        if let Some(priority) = priority {
            query = query.bind(priority.as_str());
            count_query = count_query.bind(priority.as_str());
        }
        if let Some(due_before) = due_before {
            query = query.bind(due_before.to_string());
            count_query = count_query.bind(due_before.to_string());
        }

        let rows = query
            .bind(params.limit)
            .bind(params.skip())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = count_query.fetch_one(&self.pool).await?.get("total");

        Ok((rows.iter().map(todo_from_row).collect(), total))
    }

    /// Get a todo by ID for the claimed owner.
    pub async fn get_todo(&self, user_id: &str, id: &str) -> Result<Option<Todo>, AppError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, content, completed, priority, due_date, tags, position, created_at, updated_at FROM todos WHERE id = ? AND user_id = ?"
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(todo_from_row))
    }

    /// Create a todo, appended at the end of the owner's list.
    pub async fn create_todo(
        &self,
        user_id: &str,
        request: &CreateTodoRequest,
    ) -> Result<Todo, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let content = request.content.clone().unwrap_or_default();
        let priority = request.priority.unwrap_or(Priority::Medium);
        let tags = request.tags.clone().unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        // Append after the owner's current maximum position
        let row = sqlx::query(
            "SELECT COALESCE(MAX(position), -1) + 1 AS next FROM todos WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let position: i64 = row.get("next");

        sqlx::query(
            "INSERT INTO todos (id, user_id, title, content, completed, priority, due_date, tags, position, created_at, updated_at) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(user_id)
        .bind(&request.title)
        .bind(&content)
        .bind(priority.as_str())
        .bind(&request.due_date)
        .bind(serde_json::to_string(&tags)?)
        .bind(position)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Todo {
            id,
            user: user_id.to_string(),
            title: request.title.clone(),
            content,
            completed: false,
            priority,
            due_date: request.due_date.clone(),
            tags,
            position,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Partially update a todo.
    pub async fn update_todo(
        &self,
        user_id: &str,
        id: &str,
        request: &UpdateTodoRequest,
    ) -> Result<Todo, AppError> {
        let existing = self
            .get_todo(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Todo not found".to_string()))?;

        let title = request.title.clone().unwrap_or(existing.title);
        let content = request.content.clone().unwrap_or(existing.content);
        let completed = request.completed.unwrap_or(existing.completed);
        let priority = request.priority.unwrap_or(existing.priority);
        let due_date = request.due_date.clone().or(existing.due_date);
        let tags = request.tags.clone().unwrap_or(existing.tags);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE todos SET title = ?, content = ?, completed = ?, priority = ?, due_date = ?, tags = ?, updated_at = ? WHERE id = ? AND user_id = ?"
        )
        .bind(&title)
        .bind(&content)
        .bind(completed as i32)
        .bind(priority.as_str())
        .bind(&due_date)
        .bind(serde_json::to_string(&tags)?)
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(Todo {
            id: id.to_string(),
            user: user_id.to_string(),
            title,
            content,
            completed,
            priority,
            due_date,
            tags,
            position: existing.position,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a todo and close the gap it leaves: every later item in the
    /// owner's list shifts down by one.
    pub async fn delete_todo(&self, user_id: &str, id: &str) -> Result<(), AppError> {
        let todo = self
            .get_todo(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Todo not found".to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE todos SET position = position - 1 WHERE user_id = ? AND position > ?",
        )
        .bind(user_id)
        .bind(todo.position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Move a todo to a new position, shifting the items in between.
    ///
    /// The target is clamped to the owner's `[0, count-1]` range so the
    /// positions stay dense whatever the caller sends.
    pub async fn reposition_todo(
        &self,
        user_id: &str,
        id: &str,
        new_position: i64,
    ) -> Result<Todo, AppError> {
        let todo = self
            .get_todo(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Todo not found".to_string()))?;

        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS total FROM todos WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .get("total");

        let old_position = todo.position;
        let new_position = new_position.min(count - 1).max(0);

        if new_position == old_position {
            tx.commit().await?;
            return Ok(todo);
        }

        if new_position > old_position {
            // Moving later: pull the intervening items one step earlier
            sqlx::query(
                "UPDATE todos SET position = position - 1 WHERE user_id = ? AND position > ? AND position <= ?"
            )
            .bind(user_id)
            .bind(old_position)
            .bind(new_position)
            .execute(&mut *tx)
            .await?;
        } else {
            // Moving earlier: push the intervening items one step later
            sqlx::query(
                "UPDATE todos SET position = position + 1 WHERE user_id = ? AND position >= ? AND position < ?"
            )
            .bind(user_id)
            .bind(new_position)
            .bind(old_position)
            .execute(&mut *tx)
            .await?;
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE todos SET position = ?, updated_at = ? WHERE id = ?")
            .bind(new_position)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Todo {
            position: new_position,
            updated_at: now,
            ..todo
        })
    }

    /// Per-owner todo statistics.
    pub async fn todo_stats(&self, user_id: &str) -> Result<TodoStats, AppError> {
        let now = Utc::now().to_rfc3339();

        let total_todos: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM todos WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?
                .get("total");
        let completed_todos: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM todos WHERE user_id = ? AND completed = 1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .get("total");
        let pending_todos = total_todos - completed_todos;
        let overdue_todos: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM todos WHERE user_id = ? AND completed = 0 AND due_date IS NOT NULL AND due_date < ?"
        )
        .bind(user_id)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?
        .get("total");
        let today_todos: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM todos WHERE user_id = ? AND completed = 0 AND due_date IS NOT NULL AND date(due_date) = date('now')"
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let breakdown_rows = sqlx::query(
            "SELECT priority, COUNT(*) AS count FROM todos WHERE user_id = ? AND completed = 0 GROUP BY priority"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut priority_breakdown = PriorityBreakdown::default();
        for row in breakdown_rows {
            let priority: String = row.get("priority");
            let count: i64 = row.get("count");
            match priority.as_str() {
                "high" => priority_breakdown.high = count,
                "medium" => priority_breakdown.medium = count,
                "low" => priority_breakdown.low = count,
                _ => {}
            }
        }

        let completion_rate = if total_todos > 0 {
            (completed_todos * 100 + total_todos / 2) / total_todos
        } else {
            0
        };

        Ok(TodoStats {
            total_todos,
            completed_todos,
            pending_todos,
            overdue_todos,
            today_todos,
            completion_rate,
            priority_breakdown,
        })
    }

    /// Patch several of the owner's todos at once.
    ///
    /// Every claimed ID must belong to the owner; otherwise nothing is
    /// applied.
    pub async fn bulk_update_todos(
        &self,
        user_id: &str,
        todo_ids: &[String],
        updates: &UpdateTodoRequest,
    ) -> Result<BulkUpdateResult, AppError> {
        let placeholders = vec!["?"; todo_ids.len()].join(", ");

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM todos WHERE user_id = ? AND id IN ({})",
            placeholders
        );
        let mut count_query = sqlx::query(&count_sql).bind(user_id);
        for id in todo_ids {
            count_query = count_query.bind(id);
        }
        let owned: i64 = count_query.fetch_one(&self.pool).await?.get("total");

        if owned != todo_ids.len() as i64 {
            return Err(AppError::NotFound(
                "Some todos not found or not authorized".to_string(),
            ));
        }

        // Build the SET clause from the whitelisted fields only
        let mut set_clauses = Vec::new();
        if updates.title.is_some() {
            set_clauses.push("title = ?");
        }
        if updates.content.is_some() {
            set_clauses.push("content = ?");
        }
        if updates.completed.is_some() {
            set_clauses.push("completed = ?");
        }
        if updates.priority.is_some() {
            set_clauses.push("priority = ?");
        }
        if updates.due_date.is_some() {
            set_clauses.push("due_date = ?");
        }
        if updates.tags.is_some() {
            set_clauses.push("tags = ?");
        }
        set_clauses.push("updated_at = ?");

        let sql = format!(
            "UPDATE todos SET {} WHERE user_id = ? AND id IN ({})",
            set_clauses.join(", "),
            placeholders
        );

        let now = Utc::now().to_rfc3339();
        let tags_json = match &updates.tags {
            Some(tags) => Some(serde_json::to_string(tags)?),
            None => None,
        };

        let mut query = sqlx::query(&sql);
        if let Some(title) = &updates.title {
            query = query.bind(title);
        }
        if let Some(content) = &updates.content {
            query = query.bind(content);
        }
        if let Some(completed) = updates.completed {
            query = query.bind(completed as i32);
        }
        if let Some(priority) = updates.priority {
            query = query.bind(priority.as_str());
        }
        if let Some(due_date) = &updates.due_date {
            query = query.bind(due_date);
        }
        if let Some(tags_json) = &tags_json {
            query = query.bind(tags_json);
        }
        query = query.bind(&now).bind(user_id);
        for id in todo_ids {
            query = query.bind(id);
        }

        let result = query.execute(&self.pool).await?;

        Ok(BulkUpdateResult {
            modified_count: result.rows_affected(),
            matched_count: owned as u64,
        })
    }

    // ==================== SHARED HELPERS ====================

    /// Author projection for embedding in posts, comments and messages.
    pub async fn get_author_info(&self, user_id: &str) -> Result<Option<AuthorInfo>, AppError> {
        let row = sqlx::query("SELECT id, username, avatar FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| AuthorInfo {
            id: row.get("id"),
            username: row.get("username"),
            avatar: row.get("avatar"),
        }))
    }
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let is_verified: i32 = row.get("is_verified");
    let role: String = row.get("role");
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        bio: row.get("bio"),
        avatar: row.get("avatar"),
        role: Role::from_str(&role).unwrap_or(Role::User),
        is_verified: is_verified != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> Post {
    let likes: String = row.get("likes");
    let saves: String = row.get("saves");
    let comments: String = row.get("comments");
    Post {
        id: row.get("id"),
        author_id: row.get("author_id"),
        content: row.get("content"),
        image_url: row.get("image_url"),
        link_url: row.get("link_url"),
        likes: parse_json_array(&likes),
        saves: parse_json_array(&saves),
        comments: parse_json_array(&comments),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn comment_from_row(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> ChatMessage {
    let is_anonymous: i32 = row.get("is_anonymous");
    let replies: String = row.get("replies");
    ChatMessage {
        id: row.get("id"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        is_anonymous: is_anonymous != 0,
        parent_id: row.get("parent_id"),
        replies: parse_json_array(&replies),
        likes: row.get("likes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn todo_from_row(row: &sqlx::sqlite::SqliteRow) -> Todo {
    let completed: i32 = row.get("completed");
    let priority: String = row.get("priority");
    let tags: String = row.get("tags");
    Todo {
        id: row.get("id"),
        user: row.get("user_id"),
        title: row.get("title"),
        content: row.get("content"),
        completed: completed != 0,
        priority: Priority::from_str(&priority).unwrap_or(Priority::Medium),
        due_date: row.get("due_date"),
        tags: parse_json_array(&tags),
        position: row.get("position"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
