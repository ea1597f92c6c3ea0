//! Content response mapper.
//!
//! Validates a [`GenerationReply`] against the shape its request asked for
//! and converts it into domain records. Any mismatch is reported as
//! [`StudyBuddyError::MalformedGenerationReply`]; the raw reply text never
//! ends up in the error message.
//!
//! Fields the reply does not carry are filled with defaults: difficulty
//! `medium`, question type `multiple_choice`, topic `General`.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Result, StudyBuddyError};
use crate::model::{
    Course, CourseAnswer, Difficulty, InstructorReport, PracticeProblem, ProficiencyLevel,
    QuestionKind, StudentProgress, StudyGuide, StudyPlan, TopicProficiency,
};
use crate::weak_topics::weakest_first;
use crate::traits::{extract_json_from_markdown, GenerationReply};

/// Difficulty recorded when the request did not pin one.
pub const DEFAULT_DIFFICULTY: Difficulty = Difficulty::Medium;

/// Question type recorded when the request did not pin one.
pub const DEFAULT_QUESTION_KIND: QuestionKind = QuestionKind::MultipleChoice;

/// Topic recorded when the request did not pin one.
pub const DEFAULT_TOPIC: &str = "General";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProblemListReply {
    problems: Vec<ProblemReply>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProblemReply {
    question_text: String,
    answer: String,
    explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentReply {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanReply {
    topics: Vec<String>,
    proficiency_levels: Vec<LevelReply>,
    recommended_study_order: Vec<String>,
    estimated_study_time: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelReply {
    topic: String,
    level: ProficiencyLevel,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnswerReply {
    answer: String,
    related_topics: Vec<String>,
    confidence_score: f64,
    #[serde(default)]
    suggested_follow_up_questions: Vec<String>,
}

/// Parse the reply body into `T`, classifying every failure as malformed.
fn parse_reply<T: DeserializeOwned>(reply: &GenerationReply, shape: &str) -> Result<T> {
    let body = extract_json_from_markdown(&reply.content);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        StudyBuddyError::MalformedGenerationReply(format!("reply is not valid JSON: {e}"))
    })?;
    serde_json::from_value(value).map_err(|e| {
        StudyBuddyError::MalformedGenerationReply(format!("reply does not match {shape}: {e}"))
    })
}

/// Map a practice-problem reply into records for `course`.
pub fn map_practice_problems(
    reply: &GenerationReply,
    course: &Course,
    topic: Option<&str>,
    difficulty: Option<Difficulty>,
    question_type: Option<QuestionKind>,
) -> Result<Vec<PracticeProblem>> {
    let parsed: ProblemListReply = parse_reply(reply, "{problems: [...]}")?;
    if parsed.problems.is_empty() {
        return Err(StudyBuddyError::MalformedGenerationReply(
            "reply contains no problems".into(),
        ));
    }

    let topic = topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TOPIC)
        .to_string();
    let difficulty = difficulty.unwrap_or(DEFAULT_DIFFICULTY);
    let question_type = question_type.unwrap_or(DEFAULT_QUESTION_KIND);
    let now = Utc::now();

    parsed
        .problems
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            if p.question_text.trim().is_empty() || p.answer.trim().is_empty() {
                return Err(StudyBuddyError::MalformedGenerationReply(format!(
                    "problem {i} has an empty question or answer"
                )));
            }
            Ok(PracticeProblem {
                id: Uuid::new_v4(),
                course_id: course.id.clone(),
                topic: Some(topic.clone()),
                difficulty: Some(difficulty),
                question_type: Some(question_type),
                question_text: p.question_text,
                answer: p.answer,
                explanation: p.explanation,
                created_at: now,
            })
        })
        .collect()
}

fn parse_content(reply: &GenerationReply) -> Result<String> {
    let parsed: ContentReply = parse_reply(reply, "{content}")?;
    if parsed.content.trim().is_empty() {
        return Err(StudyBuddyError::MalformedGenerationReply(
            "reply content is empty".into(),
        ));
    }
    Ok(parsed.content)
}

/// Map a study-guide reply. The guide's topic label joins `topics` with ", ".
pub fn map_study_guide(
    reply: &GenerationReply,
    course: &Course,
    topics: &[String],
) -> Result<StudyGuide> {
    let content = parse_content(reply)?;
    let topic = if topics.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        topics.join(", ")
    };
    let now = Utc::now();
    Ok(StudyGuide {
        id: Uuid::new_v4(),
        course_id: course.id.clone(),
        topic,
        content,
        created_at: now,
        updated_at: now,
    })
}

/// Map an instructor-report reply.
pub fn map_instructor_report(reply: &GenerationReply, course: &Course) -> Result<InstructorReport> {
    Ok(InstructorReport {
        course_id: course.id.clone(),
        content: parse_content(reply)?,
        created_at: Utc::now(),
    })
}

/// Trimmed, non-blank, first occurrence wins.
fn clean_list(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Map a study-plan reply for one learner.
///
/// Recorded scores take precedence over the generator: every recorded topic
/// gets the level its score implies, and weak topics lead the study order,
/// weakest first, whether or not the reply mentioned them.
pub fn map_study_plan(
    reply: &GenerationReply,
    course: &Course,
    records: &[StudentProgress],
    threshold: f64,
) -> Result<StudyPlan> {
    let parsed: PlanReply = parse_reply(reply, "{topics, proficiency_levels, ...}")?;
    let mut topics = clean_list(parsed.topics);
    let suggested_order = clean_list(parsed.recommended_study_order);
    if topics.is_empty() || suggested_order.is_empty() {
        return Err(StudyBuddyError::MalformedGenerationReply(
            "study plan has no topics or no study order".into(),
        ));
    }

    let weak = weakest_first(records, threshold);
    let recommended_study_order = clean_list(weak.into_iter().chain(suggested_order));
    for topic in &recommended_study_order {
        if !topics.contains(topic) {
            topics.push(topic.clone());
        }
    }

    let mut proficiency_levels: Vec<TopicProficiency> = Vec::new();
    for entry in parsed.proficiency_levels {
        let topic = entry.topic.trim();
        if topic.is_empty() || proficiency_levels.iter().any(|p| p.topic == topic) {
            continue;
        }
        proficiency_levels.push(TopicProficiency {
            topic: topic.to_string(),
            level: entry.level,
        });
    }
    for record in records {
        let level = ProficiencyLevel::from_score(record.proficiency_score, threshold);
        match proficiency_levels.iter_mut().find(|p| p.topic == record.topic) {
            Some(existing) => existing.level = level,
            None => proficiency_levels.push(TopicProficiency {
                topic: record.topic.clone(),
                level,
            }),
        }
    }

    Ok(StudyPlan {
        course_id: course.id.clone(),
        topics,
        proficiency_levels,
        recommended_study_order,
        estimated_study_time: parsed.estimated_study_time,
        created_at: Utc::now(),
    })
}

/// Map a course-chat reply.
pub fn map_course_answer(
    reply: &GenerationReply,
    course: &Course,
    question: &str,
) -> Result<CourseAnswer> {
    let parsed: AnswerReply = parse_reply(reply, "{answer, related_topics, confidence_score}")?;
    if parsed.answer.trim().is_empty() {
        return Err(StudyBuddyError::MalformedGenerationReply(
            "answer is empty".into(),
        ));
    }
    if !parsed.confidence_score.is_finite() || !(0.0..=1.0).contains(&parsed.confidence_score) {
        return Err(StudyBuddyError::MalformedGenerationReply(
            "confidence_score must be between 0 and 1".into(),
        ));
    }
    Ok(CourseAnswer {
        course_id: course.id.clone(),
        question: question.to_string(),
        answer: parsed.answer,
        related_topics: clean_list(parsed.related_topics),
        confidence_score: parsed.confidence_score,
        suggested_follow_up_questions: clean_list(parsed.suggested_follow_up_questions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CourseId;
    use crate::request::build_practice_problem_request;
    use crate::traits::TokenUsage;

    fn course() -> Course {
        Course {
            id: CourseId::new("COMP401"),
            name: "Data Structures".into(),
            description: "Foundations of data organization.".into(),
            topics: vec!["Arrays".into(), "Graphs".into()],
        }
    }

    fn reply(content: &str) -> GenerationReply {
        GenerationReply {
            content: content.to_string(),
            model: "mock-model".into(),
            token_usage: TokenUsage::default(),
            latency_ms: 1,
        }
    }

    const TWO_PROBLEMS: &str = r#"{"problems": [
        {"question_text": "Q1 Text", "answer": "A1", "explanation": "E1"},
        {"question_text": "Q2 Text", "answer": "A2", "explanation": "E2"}
    ]}"#;

    #[test]
    fn defaults_apply_when_filters_omitted() {
        let request = build_practice_problem_request(&course(), None, None, None, 2);
        assert!(request.user_prompt.contains("Difficulty: any"));

        let problems = map_practice_problems(&reply(TWO_PROBLEMS), &course(), None, None, None)
            .unwrap();
        assert_eq!(problems.len(), 2);
        for p in &problems {
            assert_eq!(p.difficulty, Some(Difficulty::Medium));
            assert_eq!(p.question_type, Some(QuestionKind::MultipleChoice));
            assert_eq!(p.topic.as_deref(), Some("General"));
            assert_eq!(p.course_id, CourseId::new("COMP401"));
        }
        assert_eq!(problems[0].question_text, "Q1 Text");
        assert_eq!(problems[1].answer, "A2");
        assert_ne!(problems[0].id, problems[1].id);
    }

    #[test]
    fn requested_filters_are_recorded() {
        let problems = map_practice_problems(
            &reply(TWO_PROBLEMS),
            &course(),
            Some("Graphs"),
            Some(Difficulty::Easy),
            Some(QuestionKind::ShortAnswer),
        )
        .unwrap();
        assert_eq!(problems[0].topic.as_deref(), Some("Graphs"));
        assert_eq!(problems[0].difficulty, Some(Difficulty::Easy));
        assert_eq!(problems[0].question_type, Some(QuestionKind::ShortAnswer));
    }

    #[test]
    fn missing_answer_is_malformed() {
        let bad = r#"{"problems": [{"question_text": "Q", "explanation": "E"}]}"#;
        let err = map_practice_problems(&reply(bad), &course(), None, None, None).unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = map_practice_problems(&reply("Sure! Here are some problems."), &course(), None, None, None)
            .unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
    }

    #[test]
    fn bare_array_is_malformed() {
        let bare = r#"[{"question_text": "Q", "answer": "A", "explanation": "E"}]"#;
        let err = map_practice_problems(&reply(bare), &course(), None, None, None).unwrap_err();
        assert_eq!(err.kind(), "malformed_generation_reply");
    }

    #[test]
    fn empty_problem_list_is_malformed() {
        let err = map_practice_problems(&reply(r#"{"problems": []}"#), &course(), None, None, None)
            .unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let fenced = format!("```json\n{TWO_PROBLEMS}\n```");
        let problems = map_practice_problems(&reply(&fenced), &course(), None, None, None).unwrap();
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn study_guide_mapping() {
        let topics = vec!["Arrays".to_string(), "Graphs".to_string()];
        let guide = map_study_guide(
            &reply(r##"{"content": "# Guide Content\nDetails..."}"##),
            &course(),
            &topics,
        )
        .unwrap();
        assert_eq!(guide.topic, "Arrays, Graphs");
        assert_eq!(guide.content, "# Guide Content\nDetails...");
        assert_eq!(guide.created_at, guide.updated_at);
    }

    #[test]
    fn study_guide_wrong_shape() {
        let err = map_study_guide(&reply(r#"{"guide": "text"}"#), &course(), &[]).unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
        let err = map_study_guide(&reply(r#"{"content": 42}"#), &course(), &[]).unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
        let err = map_study_guide(&reply(r#"{"content": "  "}"#), &course(), &[]).unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
    }

    #[test]
    fn instructor_report_mapping() {
        let report = map_instructor_report(
            &reply(r###"{"content": "## Instructor Guide\nFocus on..."}"###),
            &course(),
        )
        .unwrap();
        assert_eq!(report.content, "## Instructor Guide\nFocus on...");
        assert_eq!(report.course_id, CourseId::new("COMP401"));
    }

    #[test]
    fn unexpected_reply_fields_are_malformed() {
        let extra = r#"{"problems": [{"question_text": "Q", "answer": "A", "explanation": "E", "hint": "h"}]}"#;
        let err = map_practice_problems(&reply(extra), &course(), None, None, None).unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));

        let err = map_instructor_report(&reply(r#"{"content": "x", "title": "t"}"#), &course())
            .unwrap_err();
        assert!(matches!(err, StudyBuddyError::MalformedGenerationReply(_)));
    }

    fn progress(topic: &str, score: f64) -> StudentProgress {
        StudentProgress {
            id: Uuid::new_v4(),
            user_id: "s1".into(),
            course_id: "COMP401".into(),
            topic: topic.into(),
            proficiency_score: score,
            problems_attempted: 4,
            problems_correct: (score * 4.0) as u32,
            last_updated: Utc::now(),
        }
    }

    const PLAN: &str = r#"{
        "topics": ["Arrays", "Graphs"],
        "proficiency_levels": [
            {"topic": "Arrays", "level": "beginner"},
            {"topic": "Graphs", "level": "advanced"}
        ],
        "recommended_study_order": ["Arrays", "Graphs"],
        "estimated_study_time": 90
    }"#;

    #[test]
    fn study_plan_puts_weak_topics_first() {
        let records = vec![
            progress("Arrays", 1.0),
            progress("Graphs", 0.5),
            progress("Recursion", 0.0),
        ];
        let plan = map_study_plan(&reply(PLAN), &course(), &records, 0.7).unwrap();

        assert_eq!(plan.course_id, CourseId::new("COMP401"));
        assert_eq!(plan.estimated_study_time, 90);
        assert_eq!(
            plan.recommended_study_order,
            vec!["Recursion", "Graphs", "Arrays"]
        );
        assert!(plan.topics.contains(&"Recursion".to_string()));

        let level = |topic: &str| {
            plan.proficiency_levels
                .iter()
                .find(|p| p.topic == topic)
                .map(|p| p.level)
        };
        assert_eq!(level("Arrays"), Some(ProficiencyLevel::Advanced));
        assert_eq!(level("Graphs"), Some(ProficiencyLevel::Intermediate));
        assert_eq!(level("Recursion"), Some(ProficiencyLevel::Beginner));
    }

    #[test]
    fn study_plan_without_progress_keeps_reply_order() {
        let plan = map_study_plan(&reply(PLAN), &course(), &[], 0.7).unwrap();
        assert_eq!(plan.recommended_study_order, vec!["Arrays", "Graphs"]);
        assert_eq!(plan.proficiency_levels[0].level, ProficiencyLevel::Beginner);
    }

    #[test]
    fn study_plan_rejects_empty_or_invalid_levels() {
        let empty = r#"{"topics": [], "proficiency_levels": [], "recommended_study_order": [], "estimated_study_time": 0}"#;
        assert!(matches!(
            map_study_plan(&reply(empty), &course(), &[], 0.7),
            Err(StudyBuddyError::MalformedGenerationReply(_))
        ));
        let bad_level = PLAN.replace("beginner", "expert");
        assert!(matches!(
            map_study_plan(&reply(&bad_level), &course(), &[], 0.7),
            Err(StudyBuddyError::MalformedGenerationReply(_))
        ));
    }

    #[test]
    fn course_answer_maps_fields() {
        let body = r#"{"answer": "Use BFS for shortest paths.", "related_topics": [" Graphs ", "Graphs"], "confidence_score": 0.85, "suggested_follow_up_questions": ["What about Dijkstra?"]}"#;
        let answer = map_course_answer(&reply(body), &course(), "BFS or DFS?").unwrap();
        assert_eq!(answer.question, "BFS or DFS?");
        assert_eq!(answer.related_topics, vec!["Graphs"]);
        assert_eq!(answer.confidence_score, 0.85);
        assert_eq!(answer.suggested_follow_up_questions.len(), 1);
    }

    #[test]
    fn course_answer_follow_ups_are_optional() {
        let body = r#"{"answer": "Yes.", "related_topics": [], "confidence_score": 1.0}"#;
        let answer = map_course_answer(&reply(body), &course(), "q").unwrap();
        assert!(answer.suggested_follow_up_questions.is_empty());
    }

    #[test]
    fn course_answer_rejects_out_of_range_confidence() {
        let body = r#"{"answer": "Yes.", "related_topics": [], "confidence_score": 1.5, "suggested_follow_up_questions": []}"#;
        assert!(matches!(
            map_course_answer(&reply(body), &course(), "q"),
            Err(StudyBuddyError::MalformedGenerationReply(_))
        ));
        let blank = r#"{"answer": "  ", "related_topics": [], "confidence_score": 0.5, "suggested_follow_up_questions": []}"#;
        assert!(matches!(
            map_course_answer(&reply(blank), &course(), "q"),
            Err(StudyBuddyError::MalformedGenerationReply(_))
        ));
    }
}
