/// Chat rooms, participants and messages
///
/// Two kinds of room exist:
///
/// - **direct**: exactly two participants. `direct_key` holds both user IDs
///   in sorted order and is unique, so asking for the room with a colleague
///   always returns the same room.
/// - **group**: named, created by a user who becomes its first admin.
///
/// Messages are persisted before they are broadcast. History is paged
/// backwards from a message ID cursor.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE chat_room_kind AS ENUM ('direct', 'group');
///
/// CREATE TABLE chat_rooms (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     kind chat_room_kind NOT NULL,
///     name VARCHAR(100),
///     direct_key TEXT UNIQUE,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_message_at TIMESTAMPTZ
/// );
///
/// CREATE TABLE chat_participants (
///     room_id UUID NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_read_at TIMESTAMPTZ,
///     PRIMARY KEY (room_id, user_id)
/// );
///
/// CREATE TABLE chat_messages (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     room_id UUID NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
///     sender_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     body TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "chat_room_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatRoomKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub kind: ChatRoomKind,

    /// Group name; `None` for direct rooms
    pub name: Option<String>,

    #[serde(skip_serializing)]
    pub direct_key: Option<String>,

    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Room as listed for one user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoomSummary {
    pub id: Uuid,
    pub kind: ChatRoomKind,

    /// Group name, or the other participant's name for direct rooms
    pub display_name: Option<String>,

    /// The other participant, for direct rooms
    pub peer_id: Option<Uuid>,

    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message: Option<String>,

    /// Messages from others newer than the caller's read marker
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatParticipant {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_name: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// One page of history, in chronological order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,

    /// True when older messages exist before the first one returned
    pub has_more: bool,
}

/// Sorted `"a:b"` key identifying the direct room between two users
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", low, high)
}

const ROOM_COLUMNS: &str = "id, organization_id, kind, name, direct_key, created_by, created_at, \
     updated_at, last_message_at";

impl ChatRoom {
    /// Returns the direct room between `user_id` and `peer_id`, creating it
    /// and both participant rows on first use.
    pub async fn find_or_create_direct(
        pool: &PgPool,
        organization_id: Uuid,
        user_id: Uuid,
        peer_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let key = direct_key(user_id, peer_id);
        let mut tx = pool.begin().await?;

        let inserted = sqlx::query_as::<_, ChatRoom>(&format!(
            "INSERT INTO chat_rooms (organization_id, kind, direct_key, created_by) \
             VALUES ($1, 'direct', $2, $3) ON CONFLICT (direct_key) DO NOTHING RETURNING {}",
            ROOM_COLUMNS
        ))
        .bind(organization_id)
        .bind(&key)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let room = match inserted {
            Some(room) => {
                ChatParticipant::add(&mut *tx, room.id, &[user_id, peer_id], false).await?;
                room
            }
            None => {
                sqlx::query_as::<_, ChatRoom>(&format!(
                    "SELECT {} FROM chat_rooms WHERE direct_key = $1",
                    ROOM_COLUMNS
                ))
                .bind(&key)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(room)
    }

    /// Creates a group with `creator_id` as admin and `member_ids` as members
    pub async fn create_group(
        pool: &PgPool,
        organization_id: Uuid,
        creator_id: Uuid,
        name: &str,
        member_ids: &[Uuid],
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let room = sqlx::query_as::<_, ChatRoom>(&format!(
            "INSERT INTO chat_rooms (organization_id, kind, name, created_by) \
             VALUES ($1, 'group', $2, $3) RETURNING {}",
            ROOM_COLUMNS
        ))
        .bind(organization_id)
        .bind(name)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        ChatParticipant::add(&mut *tx, room.id, &[creator_id], true).await?;

        let members: Vec<Uuid> = member_ids
            .iter()
            .copied()
            .filter(|id| *id != creator_id)
            .collect();
        if !members.is_empty() {
            ChatParticipant::add(&mut *tx, room.id, &members, false).await?;
        }

        tx.commit().await?;
        Ok(room)
    }

    pub async fn find_by_id_and_org(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatRoom>(&format!(
            "SELECT {} FROM chat_rooms WHERE id = $1 AND organization_id = $2",
            ROOM_COLUMNS
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    /// Rooms `user_id` participates in, most recent activity first.
    /// `kind` narrows the list to direct rooms or groups.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        kind: Option<ChatRoomKind>,
    ) -> Result<Vec<ChatRoomSummary>, sqlx::Error> {
        sqlx::query_as::<_, ChatRoomSummary>(
            r#"
            SELECT r.id,
                   r.kind,
                   COALESCE(r.name, peer_user.name) AS display_name,
                   peer.user_id AS peer_id,
                   r.last_message_at,
                   last_msg.body AS last_message,
                   (
                       SELECT COUNT(*) FROM chat_messages m
                       WHERE m.room_id = r.id
                         AND m.sender_id IS DISTINCT FROM $1
                         AND (me.last_read_at IS NULL OR m.created_at > me.last_read_at)
                   ) AS unread_count
            FROM chat_participants me
            JOIN chat_rooms r ON r.id = me.room_id
            LEFT JOIN chat_participants peer
                   ON r.kind = 'direct' AND peer.room_id = r.id AND peer.user_id <> $1
            LEFT JOIN users peer_user ON peer_user.id = peer.user_id
            LEFT JOIN LATERAL (
                SELECT body FROM chat_messages
                WHERE room_id = r.id
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ) last_msg ON TRUE
            WHERE me.user_id = $1
              AND ($2::chat_room_kind IS NULL OR r.kind = $2)
            ORDER BY COALESCE(r.last_message_at, r.created_at) DESC
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_all(pool)
        .await
    }

    pub async fn rename(pool: &PgPool, id: Uuid, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatRoom>(&format!(
            "UPDATE chat_rooms SET name = $2 WHERE id = $1 AND kind = 'group' RETURNING {}",
            ROOM_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_rooms WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl ChatParticipant {
    /// Adds users to a room; users already present are left untouched
    pub async fn add<'e, E>(
        executor: E,
        room_id: Uuid,
        user_ids: &[Uuid],
        is_admin: bool,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_participants (room_id, user_id, is_admin)
            SELECT $1, unnest($2::UUID[]), $3
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_ids)
        .bind(is_admin)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn remove(pool: &PgPool, room_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_participants WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Participants with display names, admins first
    pub async fn list(pool: &PgPool, room_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatParticipant>(
            r#"
            SELECT p.room_id, p.user_id, u.name, u.avatar_url, p.is_admin, p.joined_at, p.last_read_at
            FROM chat_participants p
            JOIN users u ON u.id = p.user_id
            WHERE p.room_id = $1
            ORDER BY p.is_admin DESC, u.name ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(pool)
        .await
    }

    /// User IDs in a room
    pub async fn user_ids(pool: &PgPool, room_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT user_id FROM chat_participants WHERE room_id = $1")
            .bind(room_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find(
        pool: &PgPool,
        room_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatParticipant>(
            r#"
            SELECT p.room_id, p.user_id, u.name, u.avatar_url, p.is_admin, p.joined_at, p.last_read_at
            FROM chat_participants p
            JOIN users u ON u.id = p.user_id
            WHERE p.room_id = $1 AND p.user_id = $2
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn is_participant(pool: &PgPool, room_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM chat_participants WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn is_admin(pool: &PgPool, room_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM chat_participants
                WHERE room_id = $1 AND user_id = $2 AND is_admin
            )
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn count(pool: &PgPool, room_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chat_participants WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(pool)
            .await
    }

    /// Moves the caller's read marker to now
    pub async fn mark_read(pool: &PgPool, room_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE chat_participants SET last_read_at = NOW() WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Largest page [`ChatMessage::list_page`] will return
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page size when the client doesn't ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 50;

impl ChatMessage {
    /// Persists a message and bumps the room's `last_message_at`
    pub async fn create(
        pool: &PgPool,
        room_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            WITH inserted AS (
                INSERT INTO chat_messages (room_id, sender_id, body)
                VALUES ($1, $2, $3)
                RETURNING id, room_id, sender_id, body, created_at
            ),
            touched AS (
                UPDATE chat_rooms SET last_message_at = (SELECT created_at FROM inserted)
                WHERE id = $1
            )
            SELECT i.id, i.room_id, i.sender_id, u.name AS sender_name, i.body, i.created_at
            FROM inserted i
            LEFT JOIN users u ON u.id = i.sender_id
            "#,
        )
        .bind(room_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(pool)
        .await
    }

    /// Loads up to `limit` messages older than `before` (a message ID), or the
    /// newest messages when `before` is `None`.
    ///
    /// `limit` is clamped to `1..=MAX_PAGE_SIZE`. Messages come back oldest
    /// first so the client can append them directly.
    pub async fn list_page(
        pool: &PgPool,
        room_id: Uuid,
        before: Option<Uuid>,
        limit: i64,
    ) -> Result<MessagePage, sqlx::Error> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let mut rows = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT m.id, m.room_id, m.sender_id, u.name AS sender_name, m.body, m.created_at
            FROM chat_messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.room_id = $1
              AND (
                  $2::UUID IS NULL
                  OR (m.created_at, m.id) < (
                      SELECT c.created_at, c.id FROM chat_messages c
                      WHERE c.id = $2 AND c.room_id = $1
                  )
              )
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $3
            "#,
        )
        .bind(room_id)
        .bind(before)
        .bind(limit + 1)
        .fetch_all(pool)
        .await?;

        Ok(into_page(&mut rows, limit))
    }
}

/// Turns a newest-first result of up to `limit + 1` rows into a page
fn into_page(rows: &mut Vec<ChatMessage>, limit: i64) -> MessagePage {
    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    rows.reverse();

    MessagePage {
        messages: std::mem::take(rows),
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            room_id: Uuid::nil(),
            sender_id: None,
            sender_name: None,
            body: format!("m{}", offset_secs),
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_direct_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(direct_key(a, b), direct_key(b, a));
        assert_ne!(direct_key(a, b), direct_key(a, Uuid::new_v4()));
    }

    #[test]
    fn test_into_page_with_more() {
        // newest first, as returned by the query
        let mut rows = vec![message(3), message(2), message(1)];
        let page = into_page(&mut rows, 2);

        assert!(page.has_more);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[0].body, "m2");
        assert_eq!(page.messages[1].body, "m3");
    }

    #[test]
    fn test_into_page_last_page() {
        let mut rows = vec![message(1)];
        let page = into_page(&mut rows, 50);

        assert!(!page.has_more);
        assert_eq!(page.messages.len(), 1);
    }

    #[test]
    fn test_room_kind_serde() {
        assert_eq!(serde_json::to_string(&ChatRoomKind::Group).unwrap(), "\"group\"");
    }
}
