use tryon_contracts::api::TryOnOptions;

pub const DEFAULT_VIDEO_PROMPT: &str = "The person turns slowly to show the outfit.";

pub fn try_on_instruction(options: &TryOnOptions, extra: Option<&str>) -> String {
    let mut lines = vec![
        "The first image shows a person; the second image shows a garment.".to_string(),
        format!(
            "Dress the person in the {} from the second image, with {}.",
            options.region.describe(),
            options.fit.describe()
        ),
        "Keep the face, hair, pose, body shape, background and lighting unchanged.".to_string(),
        "Return a single photorealistic image.".to_string(),
    ];
    push_extra(&mut lines, extra);
    lines.join("\n")
}

pub fn refinement_instruction(options: &TryOnOptions, pass: u32, total: u32, extra: Option<&str>) -> String {
    let mut lines = vec![
        format!("Refinement pass {pass} of {total}."),
        "The first image is the current result; the second image is the reference garment."
            .to_string(),
        format!(
            "Adjust only the {} so it matches the reference more closely.",
            options.region.describe()
        ),
        "Everything outside the garment must stay pixel-identical.".to_string(),
    ];
    push_extra(&mut lines, extra);
    lines.join("\n")
}

pub fn edit_instruction(prompt: &str, strength: f32) -> String {
    let degree = if strength < 0.34 {
        "subtle"
    } else if strength < 0.67 {
        "moderate"
    } else {
        "strong"
    };
    format!(
        "Apply a {degree} edit to the image: {}\nLeave everything the edit does not mention unchanged.",
        prompt.trim()
    )
}

pub fn identity_transfer_instruction() -> String {
    [
        "The first image is the target scene; the second image is the reference face.",
        "Replace the face in the target scene with the reference identity.",
        "Keep the target's pose, hair, clothing, background, lighting and framing.",
    ]
    .join("\n")
}

fn push_extra(lines: &mut Vec<String>, extra: Option<&str>) {
    if let Some(extra) = extra.map(str::trim).filter(|value| !value.is_empty()) {
        lines.push(format!("Additional instructions: {extra}"));
    }
}
