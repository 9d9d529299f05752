//! Terminal merge prompt.

use std::io::IsTerminal as _;

use rapidkit_core::application::ports::{MergeChoice, MergePrompt, NonInteractivePrompt};
use rapidkit_core::domain::FileStatus;

/// Ask per file with a `dialoguer` select list.
#[cfg(feature = "interactive")]
pub struct DialoguerPrompt;

#[cfg(feature = "interactive")]
const CHOICES: [(&str, MergeChoice); 4] = [
    ("t  apply template", MergeChoice::ApplyTemplate),
    ("k  keep local", MergeChoice::KeepLocal),
    ("s  skip", MergeChoice::Skip),
    ("q  quit", MergeChoice::Quit),
];

#[cfg(feature = "interactive")]
impl MergePrompt for DialoguerPrompt {
    fn choose(&self, file: &str, status: FileStatus) -> MergeChoice {
        use dialoguer::Select;

        let labels: Vec<&str> = CHOICES.iter().map(|(label, _)| *label).collect();
        match Select::new()
            .with_prompt(format!("{file} ({status})"))
            .items(&labels)
            .default(2)
            .interact()
        {
            Ok(index) => CHOICES
                .get(index)
                .map(|(_, choice)| *choice)
                .unwrap_or(MergeChoice::Skip),
            Err(e) => {
                tracing::warn!(error = %e, "Prompt aborted; stopping merge");
                MergeChoice::Quit
            }
        }
    }
}

/// The prompt to hand to `merge module`: interactive on a terminal,
/// otherwise every file is skipped.
pub fn merge_prompt() -> Box<dyn MergePrompt> {
    if !std::io::stdin().is_terminal() {
        return Box::new(NonInteractivePrompt);
    }
    #[cfg(feature = "interactive")]
    {
        Box::new(DialoguerPrompt)
    }
    #[cfg(not(feature = "interactive"))]
    {
        tracing::warn!("Built without the interactive feature; skipping every file");
        Box::new(NonInteractivePrompt)
    }
}
