//! Content request builder.
//!
//! Turns a course, optional filters and weak-topic data into a
//! [`GenerationRequest`]: a system prompt, a user prompt and the JSON schema
//! the reply must match.
//!
//! Policies:
//! - An omitted filter is written as the sentinel [`ANY`], so every prompt
//!   line stays a complete sentence.
//! - A problem count of zero or less is clamped up to 1, and a count above
//!   [`MAX_PROBLEMS_PER_REQUEST`] is clamped down to it. Neither case fails.

use serde_json::json;

use crate::model::{Course, Difficulty, Feature, QuestionKind, StudentProgress};
use crate::proficiency::TopicSummary;
use crate::traits::{GenerationRequest, ReplySchema};

/// Sentinel for an unspecified filter dimension.
pub const ANY: &str = "any";

/// Upper bound on problems per generation call.
pub const MAX_PROBLEMS_PER_REQUEST: u32 = 20;

/// Default number of problems when the caller does not ask for a count.
pub const DEFAULT_PROBLEM_COUNT: u32 = 5;

const PRACTICE_SYSTEM_PROMPT: &str = "You are an expert computer science educator. \
Generate high-quality practice problems that test conceptual understanding and practical skills. \
Respond only with JSON matching the requested format.";

const GUIDE_SYSTEM_PROMPT: &str = "You are an expert computer science tutor. \
Create detailed, well-structured study guides to help students master complex topics. \
Respond only with JSON matching the requested format.";

const REPORT_SYSTEM_PROMPT: &str = "You are an experienced computer science instructor and curriculum designer. \
Write practical teaching guides that help course staff address where their students struggle. \
Respond only with JSON matching the requested format.";

const PLAN_SYSTEM_PROMPT: &str = "You are an expert computer science tutor. \
Build personalized study plans that order topics by need and estimate realistic study time. \
Respond only with JSON matching the requested format.";

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful teaching assistant for a computer science course. \
Answer student questions accurately and concisely, pointing to the course topics involved. \
Respond only with JSON matching the requested format.";

/// Longest question accepted by the course chat.
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Clamp a requested problem count into `1..=MAX_PROBLEMS_PER_REQUEST`.
pub fn clamp_problem_count(count: i64) -> u32 {
    count.clamp(1, MAX_PROBLEMS_PER_REQUEST as i64) as u32
}

impl ReplySchema {
    /// `{"problems": [{question_text, answer, explanation}, ...]}`
    pub fn practice_problems() -> Self {
        Self {
            name: "practice_problems".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "problems": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "question_text": {"type": "string"},
                                "answer": {"type": "string"},
                                "explanation": {"type": "string"}
                            },
                            "required": ["question_text", "answer", "explanation"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["problems"],
                "additionalProperties": false
            }),
        }
    }

    /// `{"content": "<markdown>"}`
    pub fn markdown_content() -> Self {
        Self {
            name: "markdown_content".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"}
                },
                "required": ["content"],
                "additionalProperties": false
            }),
        }
    }

    /// `{"topics", "proficiency_levels": [{topic, level}], "recommended_study_order", "estimated_study_time"}`
    pub fn study_plan() -> Self {
        Self {
            name: "study_plan".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "topics": {"type": "array", "items": {"type": "string"}},
                    "proficiency_levels": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "topic": {"type": "string"},
                                "level": {"type": "string", "enum": ["beginner", "intermediate", "advanced"]}
                            },
                            "required": ["topic", "level"],
                            "additionalProperties": false
                        }
                    },
                    "recommended_study_order": {"type": "array", "items": {"type": "string"}},
                    "estimated_study_time": {"type": "integer", "minimum": 0}
                },
                "required": ["topics", "proficiency_levels", "recommended_study_order", "estimated_study_time"],
                "additionalProperties": false
            }),
        }
    }

    /// `{"answer", "related_topics", "confidence_score", "suggested_follow_up_questions"}`
    pub fn course_answer() -> Self {
        Self {
            name: "course_answer".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "string"},
                    "related_topics": {"type": "array", "items": {"type": "string"}},
                    "confidence_score": {"type": "number", "minimum": 0, "maximum": 1},
                    "suggested_follow_up_questions": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["answer", "related_topics", "confidence_score", "suggested_follow_up_questions"],
                "additionalProperties": false
            }),
        }
    }
}

fn course_line(course: &Course) -> String {
    if course.description.trim().is_empty() {
        format!("Course: {} - {}", course.id, course.name)
    } else {
        format!(
            "Course: {} - {}: {}",
            course.id,
            course.name,
            course.description.trim()
        )
    }
}

fn or_any<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| ANY.to_string())
}

/// Build a request for `count` practice problems.
pub fn build_practice_problem_request(
    course: &Course,
    topic: Option<&str>,
    difficulty: Option<Difficulty>,
    question_type: Option<QuestionKind>,
    count: i64,
) -> GenerationRequest {
    let count = clamp_problem_count(count);
    let topic = topic.map(str::trim).filter(|t| !t.is_empty());

    let user_prompt = format!(
        "Create {count} practice problems for the following course.\n\
{course}\n\
\n\
Topic: {topic}\n\
Difficulty: {difficulty}\n\
Question Type: {question_type}\n\
\n\
Each problem should:\n\
1. Test understanding of key concepts\n\
2. Be clear and unambiguous\n\
3. Include a detailed explanation of the correct answer\n\
4. Be appropriate for a computer science student\n\
5. Include relevant code examples if applicable\n\
\n\
Return a JSON object with this format:\n\
{{\"problems\": [{{\"question_text\": \"The question text\", \"answer\": \"The correct answer\", \"explanation\": \"Why it is correct\"}}]}}",
        course = course_line(course),
        topic = or_any(topic),
        difficulty = or_any(difficulty),
        question_type = or_any(question_type),
    );

    GenerationRequest::new(
        Feature::PracticeProblems,
        PRACTICE_SYSTEM_PROMPT,
        user_prompt,
        ReplySchema::practice_problems(),
    )
}

/// Build a personalized study guide request.
///
/// `weak_topics` are listed under a separate "Focus areas" section so the
/// generator can weight them; an empty list is written as "None identified".
pub fn build_study_guide_request(
    course: &Course,
    topics: &[String],
    weak_topics: &[String],
) -> GenerationRequest {
    let topic_list = if topics.is_empty() {
        ANY.to_string()
    } else {
        topics.join(", ")
    };
    let focus_list = bullet_list(weak_topics, "None identified");

    let user_prompt = format!(
        "Create a comprehensive study guide for this computer science course.\n\
{course}\n\
\n\
Topics to cover:\n\
{topic_list}\n\
\n\
Focus areas (the student is weakest here, give these extra depth):\n\
{focus_list}\n\
\n\
The study guide should:\n\
1. Explain key concepts clearly and concisely\n\
2. Include relevant examples and code snippets\n\
3. Provide step-by-step explanations for complex topics\n\
4. Include common pitfalls and how to avoid them\n\
5. Suggest additional resources for further study\n\
6. Include practice exercises and solutions\n\
7. Use markdown formatting for better readability\n\
\n\
Return the guide as a JSON object with this format:\n\
{{\"content\": \"# Title\\n... (Markdown content) ...\"}}",
        course = course_line(course),
    );

    GenerationRequest::new(
        Feature::StudyGuide,
        GUIDE_SYSTEM_PROMPT,
        user_prompt,
        ReplySchema::markdown_content(),
    )
}

/// Build a teaching-guide request from class-wide topic statistics.
pub fn build_instructor_report_request(
    course: &Course,
    summaries: &[TopicSummary],
    threshold: f64,
) -> GenerationRequest {
    let stats = if summaries.is_empty() {
        "No student progress has been recorded yet.".to_string()
    } else {
        summaries
            .iter()
            .map(|s| {
                let flag = if s.mean_proficiency < threshold {
                    " (below mastery)"
                } else {
                    ""
                };
                format!(
                    "- {}: mean proficiency {:.2} across {} student(s), {}/{} correct{}",
                    s.topic,
                    s.mean_proficiency,
                    s.learners,
                    s.problems_correct,
                    s.problems_attempted,
                    flag
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let topics = if course.topics.is_empty() {
        ANY.to_string()
    } else {
        course.topics.join(", ")
    };

    let user_prompt = format!(
        "Create a teaching guide for the staff of this computer science course.\n\
{course}\n\
\n\
Course topics:\n\
{topics}\n\
\n\
Class proficiency by topic (mastery threshold {threshold:.2}):\n\
{stats}\n\
\n\
The guide should:\n\
1. Identify the concepts students find hardest and likely misconceptions\n\
2. Suggest in-class activities and examples for those concepts\n\
3. Recommend how to sequence review sessions\n\
4. Use markdown formatting\n\
\n\
Return the guide as a JSON object with this format:\n\
{{\"content\": \"## Instructor Guide\\n... (Markdown content) ...\"}}",
        course = course_line(course),
    );

    GenerationRequest::new(
        Feature::InstructorReport,
        REPORT_SYSTEM_PROMPT,
        user_prompt,
        ReplySchema::markdown_content(),
    )
}

fn bullet_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build a study plan request from one learner's recorded proficiency.
///
/// `weak_topics` should already be ordered weakest first.
pub fn build_study_plan_request(
    course: &Course,
    records: &[StudentProgress],
    weak_topics: &[String],
    threshold: f64,
) -> GenerationRequest {
    let topics = if course.topics.is_empty() {
        ANY.to_string()
    } else {
        course.topics.join(", ")
    };
    let recorded = if records.is_empty() {
        "No attempts recorded yet.".to_string()
    } else {
        records
            .iter()
            .map(|r| {
                format!(
                    "- {}: proficiency {:.2} ({}/{} correct)",
                    r.topic, r.proficiency_score, r.problems_correct, r.problems_attempted
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let user_prompt = format!(
        "Create a personalized study plan for a student in this computer science course.\n\
{course}\n\
Course topics: {topics}\n\
\n\
Recorded proficiency (mastery threshold {threshold:.2}):\n\
{recorded}\n\
\n\
Focus areas (weakest first, study these before anything else):\n\
{focus}\n\
\n\
The plan should:\n\
1. List the topics to study\n\
2. Rate the student on each topic as beginner, intermediate or advanced\n\
3. Give a recommended study order\n\
4. Estimate the total study time in minutes\n\
\n\
Return a JSON object with this format:\n\
{{\"topics\": [\"...\"], \"proficiency_levels\": [{{\"topic\": \"...\", \"level\": \"beginner\"}}], \"recommended_study_order\": [\"...\"], \"estimated_study_time\": 120}}",
        course = course_line(course),
        focus = bullet_list(weak_topics, "None identified"),
    );

    GenerationRequest::new(
        Feature::StudyPlan,
        PLAN_SYSTEM_PROMPT,
        user_prompt,
        ReplySchema::study_plan(),
    )
}

/// Build a course chat request for a single question.
pub fn build_course_question_request(
    course: &Course,
    question: &str,
    weak_topics: &[String],
) -> GenerationRequest {
    let topics = if course.topics.is_empty() {
        ANY.to_string()
    } else {
        course.topics.join(", ")
    };

    let user_prompt = format!(
        "Answer a student's question about this computer science course.\n\
{course}\n\
Course topics: {topics}\n\
\n\
The student is currently weakest in:\n\
{focus}\n\
\n\
Question:\n\
{question}\n\
\n\
Rate your confidence in the answer from 0.0 to 1.0 and suggest follow-up questions where useful.\n\
\n\
Return a JSON object with this format:\n\
{{\"answer\": \"...\", \"related_topics\": [\"...\"], \"confidence_score\": 0.8, \"suggested_follow_up_questions\": [\"...\"]}}",
        course = course_line(course),
        focus = bullet_list(weak_topics, "None identified"),
    );

    GenerationRequest::new(
        Feature::CourseChat,
        CHAT_SYSTEM_PROMPT,
        user_prompt,
        ReplySchema::course_answer(),
    )
}
