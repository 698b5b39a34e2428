//! Fixed texts sent by the diagnosis engine.

use crate::channels::{ChoicePrompt, Content};

use super::catalog::Question;

/// Every fixed message the engine can send. Texts are opaque content; swap
/// the whole struct to change wording or language.
#[derive(Debug, Clone)]
pub struct Messages {
    /// Sent when the user adds the bot as a friend.
    pub greeting: String,
    /// Reply to the first message of a new (or restarted) diagnosis.
    pub introduction: String,
    /// Re-prompt for answers under the length threshold. `{min}` is replaced
    /// with the threshold and `{len}` with the answer length.
    pub elaborate: String,
    /// Sent when the classifier could not score an answer.
    pub classifier_unavailable: String,
    /// Sent to single-pass users after they finished.
    pub already_completed: String,
    /// Sent when a finished user writes again. `{tier}` and `{keyword}`
    /// (a restart command) are replaced.
    pub finished_hint: String,
    /// Result report. `{score}`, `{max}` and `{tier}` are replaced.
    pub result: String,
    /// Commentary appended to the result, indexed by tier band.
    pub tier_comments: [String; 4],
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            greeting: "Thanks for adding me! I'm a counselor bot. Send any message to start \
                       a short self-assessment."
                .to_string(),
            introduction: "Let's begin your self-assessment. First, a few quick statements: \
                           tap the option that fits you best. After that I will ask a few \
                           open questions."
                .to_string(),
            elaborate: "Could you tell me a little more? Please answer in at least {min} \
                        characters (you wrote {len})."
                .to_string(),
            classifier_unavailable: "Sorry, I couldn't process that answer just now. Please \
                                     send it again."
                .to_string(),
            already_completed: "You have already completed this diagnosis. Thank you for \
                                taking part!"
                .to_string(),
            finished_hint: "Your diagnosis is finished (tier {tier}/10). Send \"{keyword}\" to \
                            take it again."
                .to_string(),
            result: "Thank you for your answers!\nScore: {score}/{max}\nYour tier: {tier}/10"
                .to_string(),
            tier_comments: [
                "You seem to be carrying a lot right now. Talking to someone you trust, or a \
                 professional, could really help."
                    .to_string(),
                "You have some solid footing. Small, regular moments of rest may make a big \
                 difference."
                    .to_string(),
                "You are in a good place overall. Keep the habits that support you."
                    .to_string(),
                "You show strong self-awareness and resilience. Keep it up!".to_string(),
            ],
        }
    }
}

impl Messages {
    pub fn elaborate(&self, min: usize, len: usize) -> String {
        self.elaborate
            .replace("{min}", &min.to_string())
            .replace("{len}", &len.to_string())
    }

    pub fn finished_hint(&self, tier: u32, keyword: &str) -> String {
        self.finished_hint
            .replace("{tier}", &tier.to_string())
            .replace("{keyword}", keyword)
    }

    pub fn result(&self, score: u32, max: u32, tier: u32) -> String {
        let band = match tier {
            0..=3 => 0,
            4..=6 => 1,
            7..=8 => 2,
            _ => 3,
        };
        let head = self
            .result
            .replace("{score}", &score.to_string())
            .replace("{max}", &max.to_string())
            .replace("{tier}", &tier.to_string());
        format!("{head}\n\n{}", self.tier_comments[band])
    }
}

/// Render a choice question as a single-select prompt.
pub fn choice_prompt(question: &Question, index: usize, total: usize) -> Content {
    Content::Choice(ChoicePrompt {
        question: format!("({}/{}) {}", index + 1, total, question.prompt),
        options: question.options().to_vec(),
    })
}

/// Render a free-text question.
pub fn free_text_prompt(question: &Question, index: usize, total: usize) -> Content {
    Content::text(format!("Q{}/{}: {}", index + 1, total, question.prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChoiceOption;

    #[test]
    fn elaborate_fills_placeholders() {
        let text = Messages::default().elaborate(100, 12);
        assert!(text.contains("100"));
        assert!(text.contains("12"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn finished_hint_names_the_restart_keyword() {
        let text = Messages::default().finished_hint(7, "again");
        assert!(text.contains("tier 7/10"));
        assert!(text.contains("\"again\""));
        assert!(!text.contains("restart"));
    }

    #[test]
    fn result_includes_score_and_band_comment() {
        let messages = Messages::default();
        let low = messages.result(3, 75, 1);
        assert!(low.contains("Score: 3/75"));
        assert!(low.contains("tier: 1/10"));
        assert!(low.contains(&messages.tier_comments[0]));

        let top = messages.result(75, 75, 10);
        assert!(top.contains(&messages.tier_comments[3]));
    }

    #[test]
    fn prompts_are_numbered() {
        let q = Question::choice(
            "I sleep well.",
            vec![ChoiceOption {
                label: "Yes".to_string(),
                value: 1,
            }],
        );
        match choice_prompt(&q, 0, 10) {
            Content::Choice(prompt) => {
                assert_eq!(prompt.question, "(1/10) I sleep well.");
                assert_eq!(prompt.options.len(), 1);
            }
            other => panic!("expected choice prompt, got {other:?}"),
        }

        let q = Question::free_text("Why?");
        assert_eq!(free_text_prompt(&q, 2, 5), Content::text("Q3/5: Why?"));
    }
}
