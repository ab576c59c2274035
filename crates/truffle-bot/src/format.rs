use crate::client::ApiExpert;

/// Render the ranked experts as a Slack mrkdwn reply.
pub fn expert_reply(skills: &[String], experts: &[ApiExpert]) -> String {
    if experts.is_empty() {
        return format!(
            "I couldn't find anyone with recent *{}* activity. \
             They may simply not have talked about it lately.",
            skills.join(", ")
        );
    }

    let mut reply = format!(":mag: Here's who I'd ask about *{}*:\n", skills.join(", "));
    for (i, expert) in experts.iter().take(5).enumerate() {
        let name = expert
            .display_name
            .clone()
            .unwrap_or_else(|| format!("<@{}>", expert.external_id));
        let confidence = expert
            .confidence_score
            .map(|score| format!(" — {} confidence", confidence_word(score)))
            .unwrap_or_default();
        reply.push_str(&format!(
            "{}. <@{}> ({}{}, {} signals)\n",
            i + 1,
            expert.external_id,
            name,
            confidence,
            expert.evidence_count
        ));
    }
    reply
}

/// Friendly reply when anything downstream breaks.
pub fn fallback_reply() -> String {
    "Sorry, I hit a snag looking that up. Please try again in a minute.".to_string()
}

fn confidence_word(score: f64) -> &'static str {
    if score >= 0.8 {
        "high"
    } else if score >= 0.5 {
        "medium"
    } else {
        "low"
    }
}
