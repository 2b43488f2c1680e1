//! Prompts sent with every page.
//!
//! Image pages and text pages get different system prompts: an image needs
//! its text read off the pixels, an extracted-text page only needs tidying.
//! Callers can replace either system prompt through
//! [`crate::config::PipelineConfig::system_prompt`]; the per-page user
//! prompts are always built here.

/// System prompt for reading text off a page image.
pub const DEFAULT_VISION_PROMPT: &str = r#"You are an expert at extracting and structuring text from images of document pages.
Extract every piece of text in the image and keep the original layout, following these rules:

1. Keep paragraphs, lists, tables and headings as they appear
2. Preserve the exact reading order of the text
3. For multi-column layouts, read left to right, then top to bottom
4. Reproduce tables as Markdown tables wherever possible
5. Describe figures briefly as [Image: short description]
6. Render formulas and symbols as accurately as possible
7. Output Markdown

Output only the page content. Do not add explanations or analysis."#;

/// System prompt for restructuring text already extracted from a PDF.
pub const DEFAULT_STRUCTURING_PROMPT: &str = r#"You organise and structure text extracted from PDF documents.

Rules:
1. Make the extracted text easy to read
2. Restore paragraphs, headings and bullet lists
3. Never change the content; keep the original meaning exactly
4. Remove stray whitespace and line breaks
5. Rejoin sentence fragments broken by the layout
6. Where the text is garbled beyond recovery, write [illegible text]"#;

/// User prompt accompanying a page image.
pub fn vision_user_prompt(page: u32) -> String {
    format!("Extract all text content from this image (page {page}) and structure it as Markdown.")
}

/// User prompt carrying a page's extracted text.
pub fn structuring_user_prompt(page: u32, text: &str) -> String {
    format!(
        "Below is text extracted from page {page} of a PDF. Structure it for readability: \
restore paragraphs, headings and bullet lists, tidy whitespace and line breaks, and \
rejoin fragments broken by the layout.\n\nExtracted text:\n{text}"
    )
}
