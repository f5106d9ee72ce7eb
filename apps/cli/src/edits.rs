use std::path::Path;

use anyhow::{Context, Result};
use insight_core::{AnalysisDraft, AuditService, ReviewWorkflow, WorkflowError};
use tokio::fs;

/// Draft changes requested on the command line, applied after analysis.
#[derive(Debug, Default)]
pub struct DraftEdits {
    pub replacement: Option<AnalysisDraft>,
    /// Zero-based positions in the analyzed draft.
    pub drop_objectives: Vec<usize>,
    pub add_objectives: Vec<String>,
    pub desarrollo: Option<String>,
    pub actitud: Option<String>,
    pub recomendaciones: Option<String>,
}

impl DraftEdits {
    pub fn is_empty(&self) -> bool {
        self.replacement.is_none()
            && self.drop_objectives.is_empty()
            && self.add_objectives.is_empty()
            && self.desarrollo.is_none()
            && self.actitud.is_none()
            && self.recomendaciones.is_none()
    }

    /// Order: whole-draft replacement, removals (highest index first so the
    /// requested positions stay valid), additions, then the text sections.
    pub fn apply<S: AuditService>(self, workflow: &ReviewWorkflow<S>) -> Result<()> {
        if let Some(draft) = self.replacement {
            workflow.replace_draft(draft)?;
        }

        let mut drops = self.drop_objectives;
        drops.sort_unstable();
        drops.dedup();
        for index in drops.into_iter().rev() {
            workflow.remove_objective(index).map_err(|err| match err {
                WorkflowError::ObjectiveOutOfRange { len, .. } => anyhow::anyhow!(
                    "No existe el objetivo {} (el borrador tiene {})",
                    index + 1,
                    len
                ),
                other => other.into(),
            })?;
        }

        for objective in self.add_objectives {
            workflow.add_objective()?;
            let last = objective_count(workflow).saturating_sub(1);
            workflow.update_objective(last, objective)?;
        }

        if let Some(desarrollo) = self.desarrollo {
            workflow.set_desarrollo(desarrollo)?;
        }
        if let Some(actitud) = self.actitud {
            workflow.set_actitud(actitud)?;
        }
        if let Some(recomendaciones) = self.recomendaciones {
            workflow.set_recomendaciones(recomendaciones)?;
        }
        Ok(())
    }
}

fn objective_count<S: AuditService>(workflow: &ReviewWorkflow<S>) -> usize {
    workflow
        .snapshot()
        .draft
        .map(|draft| draft.objetivos.len())
        .unwrap_or(0)
}

pub async fn load_draft(path: &Path) -> Result<AnalysisDraft> {
    let json_content = fs::read_to_string(path)
        .await
        .with_context(|| format!("No se pudo leer {}", path.display()))?;
    AnalysisDraft::from_json_str(&json_content)
        .with_context(|| format!("Borrador inválido en {}", path.display()))
}

pub async fn save_draft(draft: &AnalysisDraft, path: &Path) -> Result<()> {
    let pretty_json = serde_json::to_string_pretty(draft)?;
    fs::write(path, &pretty_json)
        .await
        .with_context(|| format!("No se pudo escribir {}", path.display()))?;
    Ok(())
}
