//! Default prompt templates. `{{key}}` placeholders are filled from the
//! composed [`agentlink_core::State`].

pub const SHOULD_RESPOND_TEMPLATE: &str = "\
# Task: Decide whether {{agentName}} should reply to this {{platform}} {{itemKind}}.

About {{agentName}}:
{{bio}}

Community: r/{{subreddit}}
Allowed topics: {{allowedTopics}}
Forbidden topics: {{forbiddenTopics}}

Recent conversation:
{{recentMessages}}

Latest {{itemKind}} by {{author}}:
{{itemText}}

Answer [RESPOND] when {{agentName}} is addressed directly or can add clear value
within the allowed topics. Answer [STOP] when people ask bots to leave, the
thread turns hostile, or a moderator steps in. Otherwise answer [IGNORE].
When in doubt, [IGNORE].

Reply with exactly one of [RESPOND], [IGNORE] or [STOP].
";

pub const MESSAGE_TEMPLATE: &str = "\
# Task: Write {{agentName}}'s reply to a {{platform}} {{itemKind}}.

About {{agentName}}:
{{bio}}

Style:
{{style}}

Community: r/{{subreddit}}
Community rules:
{{customRules}}
Allowed topics: {{allowedTopics}}
Forbidden topics: {{forbiddenTopics}}

Recent conversation:
{{recentMessages}}

Latest {{itemKind}} by {{author}}:
{{itemText}}

Write only the reply text. Use markdown for code, stay on topic, and keep it
short unless a longer explanation is needed.
";
