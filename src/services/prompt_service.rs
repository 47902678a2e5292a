use serde::Serialize;

use crate::error::AppError;
use crate::models::action::ActionType;
use crate::models::file_entry::FileEntry;
use crate::services::session_service::SessionContext;

/// Everything sent to the model for one plan. `system` is fixed per build,
/// `user` carries the live instruction and directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRequest {
    pub system: String,
    pub user: String,
}

impl PlanRequest {
    /// The request used for the single retry after an unusable reply.
    pub fn with_retry_note(&self, failure: &str) -> Self {
        Self {
            system: self.system.clone(),
            user: format!(
                "{}\n\nYour previous reply could not be used: {failure}. Reply again with only one JSON object of the form {{\"actions\": [...]}} following the schema above, and no other text.",
                self.user
            ),
        }
    }
}

const PREAMBLE: &str = "You are a file organization assistant. You receive a user's instruction and \
the list of files in one directory (paths relative to it), and you propose file moves that carry out the \
instruction. You never execute anything yourself; the user reviews and confirms every move.";

const RULES: &str = "Rules:\n\
1. Only move files. Never move, create, or delete directories on their own.\n\
2. Use paths relative to the directory. Never use absolute paths or \"..\".\n\
3. Only use source paths that appear in the file list.\n\
4. Do not move hidden or system files.\n\
5. Destination folders are created automatically. Prefer common folder names \
(images -> Pictures/, documents -> Docs/, music -> Music/, videos -> Videos/, archives -> Archives/).\n\
6. Never propose deleting files. If the instruction cannot be carried out with moves, return {\"actions\": []}.\n\
7. Reply with ONLY one JSON object. No other text.";

const EXAMPLES: &str = "Example 1\n\
Instruction: move images to Pictures\n\
Files: photo.jpg, screenshot.png, notes.txt\n\
Reply:\n\
{\"actions\": [\n\
  {\"action_type\": \"move\", \"source\": \"photo.jpg\", \"destination\": \"Pictures/photo.jpg\", \"reason\": \"image file\"},\n\
  {\"action_type\": \"move\", \"source\": \"screenshot.png\", \"destination\": \"Pictures/screenshot.png\", \"reason\": \"image file\"}\n\
]}\n\
\n\
Example 2\n\
Instruction: put PDFs in Docs\n\
Files: report.pdf, song.mp3\n\
Reply:\n\
{\"actions\": [\n\
  {\"action_type\": \"move\", \"source\": \"report.pdf\", \"destination\": \"Docs/report.pdf\", \"reason\": \"PDF document\"}\n\
]}\n\
\n\
Example 3\n\
Instruction: delete all the old logs\n\
Files: app.log\n\
Reply:\n\
{\"actions\": []}";

#[derive(Serialize)]
struct ManifestRow<'a> {
    path: &'a str,
    size_bytes: u64,
    modified_at: Option<String>,
    extension: Option<&'a str>,
}

fn schema_contract() -> String {
    let allowed = ActionType::ALL
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Output schema:\n\
{{\n\
  \"actions\": [\n\
    {{\"action_type\": string, \"source\": string, \"destination\": string, \"reason\": string}}\n\
  ]\n\
}}\n\
Allowed action_type values: {allowed}.\n\
\"source\" and \"destination\" are file paths relative to the directory, and \"destination\" \
includes the file name.\n\
\"reason\" is a short explanation shown to the user."
    )
}

pub fn build_request(
    instruction: &str,
    files: &[&FileEntry],
    context: &SessionContext,
) -> Result<PlanRequest, AppError> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return Err(AppError::InvalidInstruction(
            "instruction is empty".to_string(),
        ));
    }

    let manifest = files
        .iter()
        .map(|file| ManifestRow {
            path: &file.relative_path,
            size_bytes: file.size_bytes,
            modified_at: file.modified_at.map(|t| t.to_rfc3339()),
            extension: file.extension.as_deref(),
        })
        .collect::<Vec<_>>();
    let manifest_json = serde_json::to_string_pretty(&manifest)?;

    let history = if context.is_empty() {
        "No previous turns.".to_string()
    } else {
        context
            .summaries()
            .iter()
            .enumerate()
            .map(|(i, summary)| format!("Turn {}:\n{summary}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let system = format!(
        "{PREAMBLE}\n\n{}\n\n{RULES}\n\n{EXAMPLES}",
        schema_contract()
    );
    let user = format!(
        "Previous turns in this session:\n{history}\n\n\
Files in the directory ({} total):\n{manifest_json}\n\n\
Instruction: {instruction}",
        files.len()
    );

    Ok(PlanRequest { system, user })
}
