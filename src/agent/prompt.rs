//! Prompt templates for the research agent.

use crate::tools::ToolRegistry;

/// Build the ReAct step prompt: tool list, the question, and the scratchpad of
/// earlier thoughts, actions and observations.
pub fn build_react_prompt(tools: &ToolRegistry, question: &str, scratchpad: &str) -> String {
    let tool_descriptions = tools.describe();
    let tool_names = tools.names().join(", ");

    format!(
        r#"You are a company research assistant. Use the following tools to gather information about the company:

{tool_descriptions}

Use the following format:
Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Question: {question}
Thought:{scratchpad}"#
    )
}

/// The research brief handed to the agent for one company.
pub fn research_instruction(company: &str) -> String {
    format!(
        r#"Research the company {company}.
1. Get company domain
2. Get their logo, company info,
3. and a company summary.
4. Include recent news articles.

With that information create a markdown report with the following elements and sections:

# Company Logo
(logo as a markdown image icon)
# Company Info (as a markdown list)
# Company Summary
# Between 3 to 5 company most relevant articles. Links to the articles should be included.

If no information is available, just return "No information found""#
    )
}
