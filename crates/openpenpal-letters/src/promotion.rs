//! `future_letter_unlock`: promotes letters whose `scheduled_at`
//! has arrived. Runs on a ≤10-minute cron cadence; must be idempotent since
//! a scheduler retry or overlapping tick can call it twice.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::LetterError;
use crate::repository::LetterRepository;

pub struct PromotionReport {
    pub promoted_count: usize,
}

/// Moves every letter with `scheduled_at <= now` out of its pre-release
/// state into `GENERATED`. Already-promoted letters (no longer `scheduled_at`
/// eligible per the repository's own filter) are simply absent from the
/// batch, which is what makes re-running this safe.
pub async fn promote_due_letters(
    letters: &dyn LetterRepository,
    now: DateTime<Utc>,
) -> Result<PromotionReport, LetterError> {
    let due = letters.due_for_promotion(now).await?;
    let mut promoted_count = 0;

    for mut letter in due {
        if !letter.is_future(now) {
            letter.status = openpenpal_types::LetterStatus::Generated;
            letter.updated_at = now;
            letters.save(&letter).await?;
            promoted_count += 1;
        }
    }

    if promoted_count > 0 {
        info!(promoted_count, "future letters promoted to generated");
    }

    Ok(PromotionReport { promoted_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use openpenpal_types::{Letter, LetterId, LetterStatus, LetterVisibility, UserId};
    use std::sync::Mutex;

    struct MemLetters(Mutex<Vec<Letter>>);
    #[async_trait]
    impl LetterRepository for MemLetters {
        async fn get(&self, id: LetterId) -> Result<Letter, LetterError> {
            self.0.lock().unwrap().iter().find(|l| l.id == id).cloned().ok_or(LetterError::LetterNotFound)
        }
        async fn save(&self, letter: &Letter) -> Result<(), LetterError> {
            let mut g = self.0.lock().unwrap();
            if let Some(slot) = g.iter_mut().find(|l| l.id == letter.id) {
                *slot = letter.clone();
            }
            Ok(())
        }
        async fn due_for_promotion(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Letter>, LetterError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.status == LetterStatus::Draft && l.scheduled_at.map(|at| at <= now).unwrap_or(false))
                .cloned()
                .collect())
        }
    }

    fn scheduled_letter(scheduled_at: DateTime<Utc>) -> Letter {
        let now = Utc::now();
        Letter {
            id: LetterId::new(),
            author_id: UserId::new(),
            title: "future".to_string(),
            content: "see you soon".to_string(),
            visibility: LetterVisibility::Private,
            status: LetterStatus::Draft,
            scheduled_at: Some(scheduled_at),
            recipient_op_code: None,
            style: None,
            reply_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn promotes_letters_whose_time_has_come() {
        let now = Utc::now();
        let due = scheduled_letter(now - Duration::minutes(1));
        let due_id = due.id;
        let letters = MemLetters(Mutex::new(vec![due]));

        let report = promote_due_letters(&letters, now).await.unwrap();
        assert_eq!(report.promoted_count, 1);
        let promoted = letters.get(due_id).await.unwrap();
        assert_eq!(promoted.status, LetterStatus::Generated);
    }

    #[tokio::test]
    async fn running_twice_promotes_only_once() {
        let now = Utc::now();
        let due = scheduled_letter(now - Duration::minutes(1));
        let letters = MemLetters(Mutex::new(vec![due]));

        promote_due_letters(&letters, now).await.unwrap();
        let second = promote_due_letters(&letters, now).await.unwrap();
        assert_eq!(second.promoted_count, 0);
    }
}
