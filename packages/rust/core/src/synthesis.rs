//! Synthesis and refinement prompts and calls.

use tracing::{info, instrument};

use sdsynth_llm::{ChatMessage, CompletionRequest, LlmBackend};
use sdsynth_shared::{Result, SourceTexts, SynthError};

use crate::ModelParams;

/// Phrase the model must use for template fields with no source material.
pub const MISSING_INFO_PHRASE: &str = "Information not provided in source documents.";

pub const SUPPORTING_SECTION_HEADER: &str = "**4. Additional Supporting Document Content:**";
pub const PARENT_SECTION_HEADER: &str = "**5. Parent Solution Document (Reference):**";

/// Marker placed before user-supplied supplemental text.
pub const SUPPLEMENT_MARKER: &str = "[User Provided Supplemental Information]:";

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You are an expert Solution Document architect.

Your mandate:
1. Synthesis: you receive a Regulatory Document, a Business Requirements Document (BRD/URF) and a \
Solution Document (SD) template in XML. Combine them into one final Solution Document.
2. Template adherence: the output must follow the exact structure, order and hierarchy of the XML \
template. Take the section headers from the XML elements and do not add or drop sections.
3. Mapping: map every business requirement from the BRD/URF onto the constraints of the regulatory document.
4. Strict grounding: use only information stated in the supplied documents. Never invent or assume details.
5. Missing information: when the template asks for a detail that none of the documents provide, write exactly: \
*\"Information not provided in source documents.\"*
6. Format: professional technical tone, Markdown output (headings, lists, bold, tables).";

pub const REFINEMENT_SYSTEM_PROMPT: &str = "\
You are an expert Solution Document architect.
Revise the Solution Document you are given, following the user's instructions exactly.
Keep the professional tone, the Markdown formatting and the overall structure unless the instructions say otherwise.
Return only the revised document, with no introduction or closing remarks.";

/// The user message of a synthesis request.
///
/// The supporting section is omitted entirely when the supporting text is
/// blank; the parent section appears only when a parent document is given.
pub fn synthesis_prompt(inputs: &SourceTexts) -> String {
    let mut prompt = format!(
        "Several source documents follow. Synthesize them into one Solution Document (SD), \
         following the system instructions and the layout of the XML SD template below.\n\n\
         ---\n\
         ### INPUT DOCUMENTS:\n\
         **1. Regulatory Document Content:**\n{regulatory}\n\n\
         **2. Business Requirement Document (BRD/URF) Content:**\n{business}\n\n\
         **3. Solution Document (SD) Template Structure (MANDATORY OUTPUT FORMAT - XML):**\n{template}\n",
        regulatory = inputs.regulatory,
        business = inputs.business,
        template = inputs.template,
    );

    if !inputs.supporting.trim().is_empty() {
        prompt.push_str(&format!(
            "\n---\n{SUPPORTING_SECTION_HEADER}\n{}\n",
            inputs.supporting
        ));
    }

    if let Some(parent) = inputs.parent.as_deref().filter(|p| !p.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n---\n{PARENT_SECTION_HEADER}\n{parent}\n\n\
             *Instruction: this earlier Solution Document is background only. Use it to pre-fill \
             common project details, architecture patterns and standard constraints that still apply. \
             Where it disagrees with the current input documents, the current documents win.*\n"
        ));
    }

    prompt
}

pub fn synthesis_request(params: &ModelParams, inputs: &SourceTexts) -> CompletionRequest {
    params
        .request()
        .message(ChatMessage::system(SYNTHESIS_SYSTEM_PROMPT))
        .message(ChatMessage::user(synthesis_prompt(inputs)))
}

/// Generate the full document. Errors are returned untouched; the caller keeps
/// its prior state.
#[instrument(skip_all, fields(
    regulatory_bytes = inputs.regulatory.as_str().len(),
    business_bytes = inputs.business.as_str().len(),
    has_parent = inputs.parent.is_some(),
))]
pub async fn synthesize(
    backend: &dyn LlmBackend,
    params: &ModelParams,
    inputs: &SourceTexts,
) -> Result<String> {
    let document = backend.complete(synthesis_request(params, inputs)).await?;
    info!(bytes = document.len(), "document synthesized");
    Ok(document)
}

pub fn refinement_prompt(document: &str, instruction: &str) -> String {
    format!("### CURRENT DOCUMENT:\n{document}\n\n### REVISION INSTRUCTIONS:\n{instruction}")
}

pub fn refinement_request(params: &ModelParams, document: &str, instruction: &str) -> CompletionRequest {
    params
        .request()
        .message(ChatMessage::system(REFINEMENT_SYSTEM_PROMPT))
        .message(ChatMessage::user(refinement_prompt(document, instruction)))
}

/// Revise `document`. The returned text replaces the current document as a whole.
#[instrument(skip_all, fields(document_bytes = document.len()))]
pub async fn refine(
    backend: &dyn LlmBackend,
    params: &ModelParams,
    document: &str,
    instruction: &str,
) -> Result<String> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return Err(SynthError::validation("refinement instruction must not be empty"));
    }

    let revised = backend
        .complete(refinement_request(params, document, instruction))
        .await?;
    info!(bytes = revised.len(), "document refined");
    Ok(revised)
}

/// Append user-supplied supplemental text to the supporting text. Blank
/// supplements are ignored.
pub fn append_supplement(supporting: &mut String, supplement: &str) {
    let supplement = supplement.trim();
    if supplement.is_empty() {
        return;
    }
    supporting.push_str("\n\n");
    supporting.push_str(SUPPLEMENT_MARKER);
    supporting.push('\n');
    supporting.push_str(supplement);
}
