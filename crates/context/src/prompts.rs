//! Prompt templates for grounded answers and follow-up questions

/// Answer returned when no evidence could be assembled for a query
pub const NO_GROUNDING_RESPONSE: &str =
    "I could not find any information in the knowledge graph that relates to this question.";

/// System prompt for grounded answers.
///
/// Placeholders: `{response_type}`, `{context_data}`.
pub const LOCAL_SEARCH_SYSTEM_PROMPT: &str = "\
---Role---

You are an assistant answering questions about the data in the tables below.

---Goal---

Write a response of the requested length and format that answers the user's question. \
Summarize the information in the data tables and use general knowledge only where it \
helps to connect the facts the tables contain.

If the tables do not contain the answer, say so. Do not make anything up.

Support statements with references to the records they come from, in the form \
[Data: <category> (<record ids>)]. List at most five ids per reference and add \"+more\" \
when there are more.

---Target response length and format---

{response_type}

---Data tables---

{context_data}

Style the response in markdown with sections as appropriate.
";

/// System prompt for follow-up question generation.
///
/// Placeholders: `{question_count}`, `{context_data}`.
pub const QUESTION_SYSTEM_PROMPT: &str = "\
---Role---

You are an assistant proposing follow-up questions about the data in the tables below.

---Goal---

Given the user's previous questions and the data tables, write {question_count} \
candidate questions the user is likely to ask next. Each question must be answerable \
from the data tables and should mention the specific entities or themes they refer to.

Write one question per line as a bullet, with no other text.

---Data tables---

{context_data}
";

/// Fill the grounded-answer system prompt
pub fn local_search_prompt(context_data: &str, response_type: &str) -> String {
    LOCAL_SEARCH_SYSTEM_PROMPT
        .replace("{response_type}", response_type)
        .replace("{context_data}", context_data)
}

/// Fill the question generation system prompt
pub fn question_prompt(context_data: &str, question_count: usize) -> String {
    QUESTION_SYSTEM_PROMPT
        .replace("{question_count}", &question_count.to_string())
        .replace("{context_data}", context_data)
}
