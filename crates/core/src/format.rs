use crate::types::{AnalysisDraft, SessionMetadata};

/// Shorten a transcript for display, cutting on a character boundary.
pub fn format_transcript_excerpt(transcript: &str, max_chars: usize) -> String {
    let transcript = transcript.trim();
    if transcript.chars().count() <= max_chars {
        return transcript.to_string();
    }
    let excerpt: String = transcript.chars().take(max_chars).collect();
    format!("{}…", excerpt.trim_end())
}

/// Format a draft report as human-readable markdown
pub fn format_draft_readable(draft: &AnalysisDraft, metadata: &SessionMetadata) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Sesión {} de {}: {}\n\n",
        metadata.session_number, metadata.total_sessions, metadata.student_name
    ));
    output.push_str(&format!(
        "**Profesor:** {} | **Fecha:** {}\n\n",
        metadata.teacher_name,
        metadata.session_date_iso()
    ));

    output.push_str("## Objetivos de la Sesión\n\n");
    if draft.objetivos.is_empty() {
        output.push_str("(sin objetivos)\n");
    }
    for (i, objective) in draft.objetivos.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, objective));
    }
    output.push('\n');

    push_section(&mut output, "Desarrollo de la Sesión", &draft.desarrollo);
    push_section(&mut output, "Actitud en Clase", &draft.actitud);
    push_section(&mut output, "Recomendaciones", &draft.recomendaciones);

    output
}

fn push_section(output: &mut String, title: &str, body: &str) {
    output.push_str(&format!("## {}\n\n", title));
    if body.trim().is_empty() {
        output.push_str("(vacío)");
    } else {
        output.push_str(body.trim());
    }
    output.push_str("\n\n");
}
