//! "A reply is a new letter carrying `reply_to` = source letter id.
//! No constraint forces delivery order; the thread is a linked list."

use chrono::Utc;
use openpenpal_types::{Letter, LetterId, LetterStatus, LetterVisibility, UserId};

use crate::error::LetterError;
use crate::repository::LetterRepository;

pub struct ReplyDraft {
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub visibility: LetterVisibility,
    pub style: Option<String>,
}

pub async fn compose_reply(
    letters: &dyn LetterRepository,
    source_letter_id: LetterId,
    draft: ReplyDraft,
) -> Result<Letter, LetterError> {
    letters.get(source_letter_id).await.map_err(|_| LetterError::InvalidReplyTarget)?;

    let now = Utc::now();
    let reply = Letter {
        id: LetterId::new(),
        author_id: draft.author_id,
        title: draft.title,
        content: draft.content,
        visibility: draft.visibility,
        status: LetterStatus::Draft,
        scheduled_at: None,
        recipient_op_code: None,
        style: draft.style,
        reply_to: Some(source_letter_id),
        created_at: now,
        updated_at: now,
    };
    letters.save(&reply).await?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MemLetters(Mutex<Vec<Letter>>);
    #[async_trait]
    impl LetterRepository for MemLetters {
        async fn get(&self, id: LetterId) -> Result<Letter, LetterError> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or(LetterError::LetterNotFound)
        }
        async fn save(&self, letter: &Letter) -> Result<(), LetterError> {
            self.0.lock().unwrap().push(letter.clone());
            Ok(())
        }
        async fn due_for_promotion(&self, _now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Letter>, LetterError> {
            Ok(vec![])
        }
    }

    fn source_letter() -> Letter {
        let now = Utc::now();
        Letter {
            id: LetterId::new(),
            author_id: UserId::new(),
            title: "original".to_string(),
            content: "hello".to_string(),
            visibility: LetterVisibility::Public,
            status: LetterStatus::Delivered,
            scheduled_at: None,
            recipient_op_code: None,
            style: None,
            reply_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn reply_links_back_to_source_and_starts_at_draft() {
        let source = source_letter();
        let source_id = source.id;
        let letters = MemLetters(Mutex::new(vec![source]));

        let reply = compose_reply(
            &letters,
            source_id,
            ReplyDraft {
                author_id: UserId::new(),
                title: "re: original".to_string(),
                content: "thanks for writing".to_string(),
                visibility: LetterVisibility::Private,
                style: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(reply.reply_to, Some(source_id));
        assert_eq!(reply.status, LetterStatus::Draft);
    }

    #[tokio::test]
    async fn reply_to_unknown_letter_is_rejected() {
        let letters = MemLetters(Mutex::new(vec![]));
        let result = compose_reply(
            &letters,
            LetterId::new(),
            ReplyDraft {
                author_id: UserId::new(),
                title: "t".to_string(),
                content: "c".to_string(),
                visibility: LetterVisibility::Public,
                style: None,
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), LetterError::InvalidReplyTarget);
    }
}
