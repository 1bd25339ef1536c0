/// Fixed interviewer lines for the scripted Intro and Background phases.
#[derive(Debug, Clone)]
pub struct InterviewScript {
    /// Opening turn. `{name}` is replaced with the candidate's name.
    pub welcome: String,
    pub background_prompt: String,
}

impl Default for InterviewScript {
    fn default() -> Self {
        Self {
            welcome: "Hello {name}! I'll be conducting your interview today. \
                      To start, could you briefly introduce yourself?"
                .to_string(),
            background_prompt: "Thanks. Could you walk me through your background \
                                and the experience most relevant to this role?"
                .to_string(),
        }
    }
}

impl InterviewScript {
    pub fn welcome_for(&self, candidate_name: &str) -> String {
        let name = candidate_name.trim();
        let name = if name.is_empty() { "there" } else { name };
        self.welcome.replace("{name}", name)
    }
}
