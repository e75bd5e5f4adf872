//! Persona text, prompt composition and canned lines

/// Default persona prepended to every visitor utterance
pub const PERSONA: &str = "You are a friendly concierge at a visitor information kiosk. \
Answer in one to three short spoken sentences. Do not use lists, markdown, emoji or URLs; \
everything you write is read aloud. If you don't know something, say so and suggest asking \
the staff at the front desk.";

/// Lines spoken when staff trigger a welcome
pub const WELCOME_LINES: &[&str] = &[
    "Hello and welcome! What can I help you with today?",
    "Hi there, welcome! Feel free to ask me anything.",
    "Welcome! I'm here to answer your questions. What would you like to know?",
    "Good to see you! How can I help?",
];

/// Spoken when the answer generator fails and the kiosk is set to apologize
pub const APOLOGY: &str = "Sorry, I couldn't get an answer just now. Could you ask me again?";

/// Notice shown when a second utterance arrives while one is still being answered
pub const PLEASE_WAIT: &str = "Please wait, I'm still working on your last question.";

/// Stand-in answer for a request made while another is in flight
pub const STILL_PROCESSING: &str = "I'm still thinking about your previous question.";

/// Spoken after repeated recognition failures when announcements are on
pub const DIDNT_CATCH: &str = "Sorry, I didn't catch that.";

/// Combine the persona and the visitor's words into one prompt
pub fn compose_prompt(persona: &str, utterance: &str) -> String {
    let persona = persona.trim();
    let utterance = utterance.trim();
    if persona.is_empty() {
        return utterance.to_string();
    }
    format!("{}\n\nVisitor: {}", persona, utterance)
}

/// Welcome line for `index`, wrapping around; `None` if there are no lines
pub fn welcome_line(lines: &[String], index: usize) -> Option<&str> {
    if lines.is_empty() {
        None
    } else {
        Some(lines[index % lines.len()].as_str())
    }
}
