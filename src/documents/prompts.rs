//! Prompt templates served by the document backend.
//!
//! Each template takes a single `doc_id` argument and expands to one user
//! turn with the document's current content embedded.

use crate::mcp_client::types::{PromptArgument, PromptDefinition};

/// A named template: `{content}` is replaced with the document text.
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub argument_description: &'static str,
    template: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, content: &str) -> String {
        self.template.replace("{content}", content)
    }

    pub fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            arguments: vec![PromptArgument {
                name: DOC_ID_ARGUMENT.to_string(),
                description: Some(self.argument_description.to_string()),
                required: true,
            }],
        }
    }
}

/// The only argument every document prompt accepts.
pub const DOC_ID_ARGUMENT: &str = "doc_id";

pub const TEMPLATES: [PromptTemplate; 3] = [
    PromptTemplate {
        name: "rewrite_markdown",
        description: "Rewrite a document using clear, well-structured Markdown.",
        argument_description: "Id of the document to rewrite in Markdown",
        template: "You are an expert technical writer. Rewrite the following document \
                   using clear, well-structured Markdown. Keep the meaning but improve \
                   organization and readability. Use headings, bullet points, and tables \
                   when appropriate.\n\nDOCUMENT CONTENT:\n{content}",
    },
    PromptTemplate {
        name: "summarize",
        description: "Summarize a document in a concise way.",
        argument_description: "Id of the document to summarize",
        template: "Summarize the following document in a concise paragraph, \
                   highlighting the most important technical and business points:\
                   \n\nDOCUMENT CONTENT:\n{content}",
    },
    PromptTemplate {
        name: "format",
        description: "Rewrites the contents of the document in Markdown format.",
        argument_description: "Id of the document to format in Markdown",
        template: "Your goal is to reformat a document using clean, professional \
                   Markdown syntax.\n\n\
                   Instructions:\n\
                   - Add clear headings and subheadings with '#', '##', etc.\n\
                   - Use bullet lists and numbered lists where they make sense.\n\
                   - Use code blocks for technical snippets.\n\
                   - Keep the meaning of the document, but improve structure and clarity.\n\n\
                   Here is the document you must reformat:\n\n{content}",
    },
];

pub fn find(name: &str) -> Option<&'static PromptTemplate> {
    TEMPLATES.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_template_renders_content_at_the_end() {
        let text = find("format").unwrap().render("BODY");
        assert!(text.starts_with("Your goal is to reformat a document"));
        assert!(text.contains("\n- Use code blocks for technical snippets.\n"));
        assert!(text.ends_with("Here is the document you must reformat:\n\nBODY"));
    }

    #[test]
    fn test_summarize_template() {
        let text = find("summarize").unwrap().render("X");
        assert_eq!(
            text,
            "Summarize the following document in a concise paragraph, highlighting the \
             most important technical and business points:\n\nDOCUMENT CONTENT:\nX"
        );
    }

    #[test]
    fn test_definitions_declare_doc_id() {
        for template in &TEMPLATES {
            let def = template.definition();
            assert_eq!(def.arguments.len(), 1);
            assert_eq!(def.arguments[0].name, DOC_ID_ARGUMENT);
            assert!(def.arguments[0].required);
        }
        assert!(find("nope").is_none());
    }
}
