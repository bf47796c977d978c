pub mod openai2retrieval;
