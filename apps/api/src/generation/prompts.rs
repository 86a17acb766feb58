// Default prompt templates for the generation pipelines.
// Any of them can be overridden per account by name (`prompt_templates` table).
// Placeholders use `{{name}}`; see generation::render.

/// Template names, as stored in `prompt_templates.name`.
pub const IDEAS_AGENT: &str = "ideas.agent";
pub const IDEAS_STRUCTURE: &str = "ideas.structure";
pub const CAPTION_REGENERATE: &str = "caption.regenerate";
pub const BRAND_AUDIT: &str = "brand.audit";

/// Stage-1 prompt sent to the account's conversational agent.
/// Placeholders: source_title, source_text, topic_count, prior_attempts
pub const IDEAS_AGENT_TEMPLATE: &str = r#"You are a content strategist planning carousel posts.

Read the source material below and propose exactly {{topic_count}} distinct post topics.
For each topic give a title and two or three groups of talking points, each group with a short heading.

Source title: {{source_title}}

Source material:
{{source_text}}

Prior topic sets for this source:
{{prior_attempts}}"#;

/// Stage-2 prompt that turns the agent's free-form reply into strict JSON.
/// Placeholders: agent_reply, topic_count
pub const IDEAS_STRUCTURE_TEMPLATE: &str = r#"Convert the topic ideas below into JSON.

Return a JSON object with this EXACT schema (no extra fields):
{
  "topics": [
    {
      "title": "string",
      "bullets": [
        {"heading": "string", "points": ["string"]}
      ]
    }
  ]
}

Rules:
- "topics" must contain exactly {{topic_count}} entries.
- Every title, heading and point must be non-empty.
- At most 8 bullet groups per topic and 8 points per group.
- Respond with the JSON object only.

Topic ideas:
{{agent_reply}}"#;

/// Caption regeneration. Output is used verbatim as the new caption.
/// Placeholders: project_title, slides, current_caption, brand_voice, prior_attempts
pub const CAPTION_REGENERATE_TEMPLATE: &str = r#"Write a new social caption for the carousel below.

Carousel title: {{project_title}}

Slides:
{{slides}}

Current caption:
{{current_caption}}

Brand voice:
{{brand_voice}}

{{prior_attempts}}

Respond with the caption text only. No preamble, no quotes, at most 2200 characters."#;

/// Brand-alignment audit. Placeholders: brand_guidelines, project_title, slides, caption
pub const BRAND_AUDIT_TEMPLATE: &str = r#"Audit the carousel below against the brand guidelines.

Brand guidelines:
{{brand_guidelines}}

Carousel title: {{project_title}}

Slides (indexed 0-5):
{{slides}}

Caption:
{{caption}}

Return a JSON object with this EXACT schema (no extra fields):
{
  "schemaVersion": 1,
  "verdict": "aligned" | "needs_edits" | "off_brand",
  "overallScore": 0-100,
  "summary": "string",
  "checks": {
    "voiceAndTone": true,
    "terminology": true,
    "audienceFit": true,
    "visualConsistency": true,
    "claimsSubstantiated": true,
    "callToAction": true
  },
  "issues": [
    {
      "severity": "low" | "medium" | "high",
      "area": "caption" | "slide" | "overall",
      "slideIndex": 0-5 or null,
      "quote": "string" or null,
      "message": "string",
      "recommendation": "string"
    }
  ],
  "caption": {"score": 0-100, "notes": ["string"], "suggestedEdits": ["string"]},
  "slides": [
    {"slideIndex": 0, "score": 0-100, "notes": ["string"], "suggestedEdits": ["string"]}
  ]
}

"slides" must contain exactly 6 entries, one per slideIndex 0-5.
Respond with the JSON object only."#;

/// Numbered slide listing used by caption and brand prompts.
pub fn format_slides(slides: &[String]) -> String {
    slides
        .iter()
        .enumerate()
        .map(|(i, text)| format!("Slide {i}: {text}"))
        .collect::<Vec<_>>()
        .join("\n")
}
