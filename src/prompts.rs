//! Prompt templates and the rewriting rules applied before text reaches the
//! remote models.

use crate::models::MediaReference;

pub const FRAMES_TASK: &str = include_str!("../data/prompts/frames_task.txt");
pub const IDENTITY_LOCK: &str = include_str!("../data/prompts/identity_lock.txt");
pub const REFINE_FRAME: &str = include_str!("../data/prompts/refine_frame.txt");

pub const REFERENCE_CAPTION: &str = "Directorial reference for {{label}}:";

/// Prepended to video prompts when a character reference is forwarded.
pub const IDENTITY_MAPPING_PREFIX: &str =
    "CRITICAL IDENTITY MAPPING: The character from the reference MUST be the main subject. Script: ";

/// Prepended to every video extension prompt.
pub const CONTINUITY_PREFIX: &str = "STORY CONTINUITY: ";

/// Storyboard frames requested per generation.
pub const FRAME_COUNT: u32 = 4;

/// Replace `{{key}}` placeholders in a template string.
///
/// Substitution runs in `vars` order, so put user-supplied text last.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

fn character_reference(references: &[MediaReference]) -> Option<&MediaReference> {
    references.iter().find(|r| r.is_character())
}

pub fn reference_caption(label: &str) -> String {
    render(REFERENCE_CAPTION, &[("label", label)])
}

/// Final instruction part of a frame generation request.
pub fn frames_instruction(prompt: &str, references: &[MediaReference]) -> String {
    let count = FRAME_COUNT.to_string();
    let mut instruction = render(FRAMES_TASK, &[("count", &count), ("prompt", prompt)]);

    if character_reference(references).is_some() {
        instruction.push('\n');
        instruction.push_str(&render(IDENTITY_LOCK, &[("count", &count)]));
    }

    instruction
}

pub fn refine_instruction(instructions: &str) -> String {
    render(REFINE_FRAME, &[("instructions", instructions)])
}

/// Video prompt as sent: identity-mapped when any of `references` is a
/// character, including ones past the forwarding cap.
pub fn identity_mapped_prompt(prompt: &str, references: &[MediaReference]) -> String {
    match character_reference(references) {
        Some(_) => format!("{}{}", IDENTITY_MAPPING_PREFIX, prompt),
        None => prompt.to_string(),
    }
}

pub fn continuity_prompt(prompt: &str) -> String {
    format!("{}{}", CONTINUITY_PREFIX, prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(label: &str) -> MediaReference {
        MediaReference::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png", label)
    }

    #[test]
    fn test_render_multiple_vars() {
        assert_eq!(
            render("{{a}} and {{b}}", &[("a", "cats"), ("b", "dogs")]),
            "cats and dogs"
        );
    }

    #[test]
    fn test_templates_have_placeholders() {
        assert!(FRAMES_TASK.contains("{{prompt}}"));
        assert!(FRAMES_TASK.contains("{{count}}"));
        assert!(IDENTITY_LOCK.contains("{{count}}"));
        assert!(REFINE_FRAME.contains("{{instructions}}"));
    }

    #[test]
    fn test_frames_instruction_without_character_has_no_identity_lock() {
        let text = frames_instruction("A robot walks through rain", &[reference("Environment")]);
        assert_eq!(
            text,
            "TASK: Generate 4 cinematic starting frames for a video based on the script: \"A robot walks through rain\"."
        );
        assert!(!text.contains("IDENTITY LOCK"));
    }

    #[test]
    fn test_frames_instruction_with_character_adds_identity_lock() {
        let text = frames_instruction(
            "A chase on rooftops",
            &[reference("Environment"), reference("Lead Character")],
        );
        assert!(text.starts_with("TASK: Generate 4 cinematic starting frames"));
        assert!(text.contains(
            "IDENTITY LOCK: The character provided in the 'Lead Character' reference MUST be the protagonist."
        ));
        assert!(text.ends_with("across all 4 frames."));
    }

    #[test]
    fn test_identity_lock_names_lead_character_slot_for_any_character_label() {
        let text = frames_instruction("A heist", &[reference("Villain character")]);
        assert!(text.contains("provided in the 'Lead Character' reference"));
        assert!(!text.contains("Villain"));
    }

    #[test]
    fn test_user_text_is_not_re_rendered() {
        let text = frames_instruction("draw {{count}} cats", &[]);
        assert!(text.contains("\"draw {{count}} cats\""));
    }

    #[test]
    fn test_identity_mapping_prefixes_original_prompt() {
        let prompt = "She opens the door";
        let mapped = identity_mapped_prompt(prompt, &[reference("lead CHARACTER")]);
        assert!(mapped.starts_with(IDENTITY_MAPPING_PREFIX));
        assert!(mapped.ends_with(prompt));

        assert_eq!(identity_mapped_prompt(prompt, &[reference("Key Prop")]), prompt);
        assert_eq!(identity_mapped_prompt(prompt, &[]), prompt);
    }

    #[test]
    fn test_identity_mapping_sees_character_past_forwarding_cap() {
        let references = [
            reference("Environment"),
            reference("Key Prop"),
            reference("Style Reference"),
            reference("Lead Character"),
        ];
        let mapped = identity_mapped_prompt("She opens the door", &references);
        assert!(mapped.starts_with(IDENTITY_MAPPING_PREFIX));
    }

    #[test]
    fn test_refine_and_continuity() {
        assert_eq!(
            refine_instruction("Make it rainy"),
            "Refine this frame: Make it rainy. Maintain protagonist identity."
        );
        assert_eq!(continuity_prompt("Next scene"), "STORY CONTINUITY: Next scene");
        assert_eq!(
            reference_caption("Key Prop"),
            "Directorial reference for Key Prop:"
        );
    }
}
