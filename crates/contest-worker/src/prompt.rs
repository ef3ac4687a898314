//! Prompt text for defense generation.

pub const SYSTEM_PROMPT: &str = "You are a seller-support specialist contesting refund \
requests on behalf of a marketplace seller. Write a short, polite and factual appeal \
that addresses the buyer's stated reason and references the items in the order. \
Do not invent tracking numbers, dates or policies. Reply with the appeal text only.";

/// What the model is told about the buyer's evidence image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageNote {
    /// The image is attached to this message.
    Attached,
    /// The buyer sent an image but this model cannot view it.
    NotViewable,
    None,
}

impl ImageNote {
    fn text(&self) -> &'static str {
        match self {
            Self::Attached => {
                "The buyer attached the image below as evidence. Examine it and address \
                 what it shows."
            }
            Self::NotViewable => {
                "Evidence image provided: no visual analysis available. Do not describe \
                 its contents."
            }
            Self::None => "The buyer did not attach any evidence image.",
        }
    }
}

/// Build the user message. Buyer text is inserted verbatim, never expanded.
pub fn user_prompt(reason: &str, items: &str, note: ImageNote) -> String {
    format!(
        "Refund reason given by the buyer:\n{}\n\n\
         Items in the order:\n{}\n\n{}\n\n\
         Write the appeal message to send to the marketplace.",
        reason.trim(),
        items.trim(),
        note.text()
    )
}
