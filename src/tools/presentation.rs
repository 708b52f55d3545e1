use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{string_arg, string_params, Tool, ToolError, Workspace};
use crate::deck::{Deck, SlideLayout};

pub const DECK_FILE: &str = "churn_presentation.pptx";
pub const SLIDE_HEADINGS: [&str; 3] = ["Project Update: Churn Analysis", "Executive Summary", "Model Insights"];

/// The fixed three-slide stakeholder deck
pub fn churn_deck(title: &str, summary: &str, findings: &str) -> Deck {
    let mut deck = Deck::new();
    deck.add_slide(SlideLayout::Title, SLIDE_HEADINGS[0], title)
        .add_slide(SlideLayout::TitleAndContent, SLIDE_HEADINGS[1], summary)
        .add_slide(SlideLayout::TitleAndContent, SLIDE_HEADINGS[2], findings);
    deck
}

pub struct CreatePptxTool {
    workspace: Workspace,
}

impl CreatePptxTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for CreatePptxTool {
    fn name(&self) -> &str {
        "create_pptx"
    }

    fn description(&self) -> &str {
        "Create the stakeholder PowerPoint deck (churn_presentation.pptx) with a title slide, \
         an executive summary slide and a model insights slide. Overwrites any previous deck."
    }

    fn parameters(&self) -> Value {
        string_params(&[
            ("title", "Subtitle for the title slide"),
            ("summary", "Executive summary text, one point per line"),
            ("findings", "Key model findings, one point per line"),
        ])
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let title = string_arg(&args, "title")?;
        let summary = string_arg(&args, "summary")?;
        let findings = string_arg(&args, "findings")?;

        let path = self.workspace.path(DECK_FILE);
        churn_deck(&title, &summary, &findings)
            .save(&path)
            .map_err(|e| ToolError::Render(format!("{:#}", e)))?;

        info!(deck = %path.display(), "Presentation saved");
        Ok(format!("Presentation saved as '{}'", DECK_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::read_slides;
    use serde_json::json;

    #[tokio::test]
    async fn test_deck_has_fixed_headings() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CreatePptxTool::new(Workspace::new(dir.path()));
        let out = tool
            .invoke(json!({
                "title": "Q3 Retention Review",
                "summary": "Churn is concentrated in new customers",
                "findings": "Support calls drive churn\nAccuracy 0.75",
            }))
            .await
            .unwrap();
        assert_eq!(out, "Presentation saved as 'churn_presentation.pptx'");

        let slides = read_slides(&dir.path().join(DECK_FILE)).unwrap();
        assert_eq!(slides.len(), 3);
        let titles: Vec<&str> = slides.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, SLIDE_HEADINGS);
        assert_eq!(slides[0].body, "Q3 Retention Review");
        assert_eq!(slides[2].body, "Support calls drive churn\nAccuracy 0.75");
    }

    #[tokio::test]
    async fn test_headings_ignore_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CreatePptxTool::new(Workspace::new(dir.path()));
        tool.invoke(json!({"title": "", "summary": "Executive <b>", "findings": "Model Insights & more"}))
            .await
            .unwrap();

        let slides = read_slides(&dir.path().join(DECK_FILE)).unwrap();
        let titles: Vec<&str> = slides.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, SLIDE_HEADINGS);
        assert_eq!(slides[1].body, "Executive <b>");
    }
}
