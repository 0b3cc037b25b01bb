/// OpenAI Assistants API engine.
pub mod openai;
