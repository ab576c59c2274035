use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use truffle_core::types::ChatUser;

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]+)?>").unwrap())
}

/// Rewrite `<@U0123ABCD>` mentions to `@handle[external_id:U0123ABCD]` so
/// downstream text processing sees who was addressed. Unknown ids are left
/// untouched.
pub fn replace_user_mentions(text: &str, users: &HashMap<String, ChatUser>) -> String {
    mention_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let id = &caps[1];
            match users.get(id) {
                Some(user) => format!("@{}[external_id:{}]", user.handle, id),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// True when the text addresses the given bot id.
pub fn mentions_bot(text: &str, bot_id: &str) -> bool {
    !bot_id.is_empty() && text.contains(&format!("<@{bot_id}>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> HashMap<String, ChatUser> {
        HashMap::from([(
            "U123".to_string(),
            ChatUser {
                external_id: "U123".to_string(),
                display_name: "Alice".to_string(),
                handle: "alice".to_string(),
                timezone: None,
            },
        )])
    }

    #[test]
    fn rewrites_known_mentions() {
        let out = replace_user_mentions("ping <@U123> about this", &users());
        assert_eq!(out, "ping @alice[external_id:U123] about this");
    }

    #[test]
    fn rewrites_labelled_mentions() {
        let out = replace_user_mentions("ping <@U123|alice> too", &users());
        assert_eq!(out, "ping @alice[external_id:U123] too");
    }

    #[test]
    fn leaves_unknown_mentions_alone() {
        let out = replace_user_mentions("cc <@U999>", &users());
        assert_eq!(out, "cc <@U999>");
    }

    #[test]
    fn bot_mention_detection() {
        assert!(mentions_bot("hey <@B42> help", "B42"));
        assert!(!mentions_bot("hey <@B42> help", "B43"));
        assert!(!mentions_bot("no mention", "B42"));
        assert!(!mentions_bot("anything", ""));
    }
}
