// Resume analysis and polishing prompt templates.

pub const ANALYSIS_SYSTEM: &str = "\
You are a top career mentor and senior technical recruiter with over 15 years \
of experience, known for precise, insightful and demanding analysis. Evaluate \
a candidate's resume against a job description as thoroughly as you would a \
real application.";

pub const ANALYSIS_PROMPT: &str = r#"Analyze the resume against the job description below and return the result as one complete JSON object.

--- JOB DESCRIPTION ---
{jd_text}
--- END OF JOB DESCRIPTION ---

--- CANDIDATE RESUME ---
{resume_text}
--- END OF RESUME ---

Return JSON in exactly this format:
{
  "overall_score": (an integer from 0 to 100 for how well the resume matches the job),
  "ability_scores": [
    {"name": "Skill Match", "score": (0-5, one decimal allowed)},
    {"name": "Project Depth", "score": (0-5)},
    {"name": "Quantified Results", "score": (0-5)},
    {"name": "Professionalism", "score": (0-5)}
  ],
  "keyword_analysis": {
    "jd_keywords": ["(5-8 core keywords from the job description)"],
    "matched_keywords": ["(job keywords clearly present in the resume)"],
    "missing_keywords": ["(important job keywords missing from the resume)"]
  },
  "strengths_analysis": ["(2-3 standout strengths that match the job)"],
  "weaknesses_analysis": ["(2-3 clear gaps against the job)"],
  "suggestions": [
    {"module": "(resume section to change, e.g. 'Projects')", "suggestion": "(one concrete, actionable change)"}
  ]
}"#;

pub const POLISH_SYSTEM: &str = "\
You are a top resume editor and senior HR professional, expert at rewriting \
work and project descriptions with the STAR method. Rule: keep exactly the \
same HTML structure as the input (such as <ul>, <li>) and change only the text.";

pub const POLISH_PROMPT: &str = r#"Rewrite the following resume description using the STAR method.{job_context}

Original HTML:
```html
{html}
```

Return exactly this JSON: {"polished_html": "(the rewritten HTML string)"}"#;

pub fn analysis_prompt(resume_text: &str, jd_text: &str) -> String {
    ANALYSIS_PROMPT
        .replace("{jd_text}", jd_text)
        .replace("{resume_text}", resume_text)
}

pub fn polish_prompt(html: &str, job_position: Option<&str>) -> String {
    let job_context = match job_position.map(str::trim).filter(|p| !p.is_empty()) {
        Some(position) => format!(" The description is for a '{position}' application."),
        None => String::new(),
    };
    POLISH_PROMPT
        .replace("{job_context}", &job_context)
        .replace("{html}", html)
}
