//! Session serializers and the export collaborator.

use async_trait::async_trait;
use biomech_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::session::{AssessmentSession, ExerciseAssessmentResult};

pub fn export_json(session: &AssessmentSession) -> Result<String> {
    Ok(serde_json::to_string_pretty(session)?)
}

/// Parse a previously exported session; malformed input yields `None`
pub fn import_json(json: &str) -> Option<AssessmentSession> {
    match serde_json::from_str(json) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!("Rejected session import: {}", e);
            None
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;margin:1em 0}\
td,th{border:1px solid #ccc;padding:4px 8px;text-align:left}\
.excellent{color:#1b7f3a}.good{color:#3a6fb0}.fair{color:#b07b1b}.needs_work{color:#b0301b}\
@media print{body{margin:0}}";

/// Printable HTML report of a session
pub fn render_html(session: &AssessmentSession) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        concat!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">",
            "<title>Assessment {id}</title><style>{style}</style></head><body>\n",
        ),
        id = session.id,
        style = STYLE
    );
    let _ = writeln!(html, "<h1>Static Assessment Report</h1>");
    let _ = writeln!(
        html,
        "<p>Session {} &middot; {:?} &middot; started {}</p>",
        session.id,
        session.mode,
        session.started_at.format("%Y-%m-%d %H:%M")
    );

    let s = &session.summary;
    let _ = writeln!(html, "<h2>Summary</h2><table>");
    let _ = writeln!(html, "<tr><th>Exercises</th><td>{}</td></tr>", s.exercise_count);
    let _ = writeln!(html, "<tr><th>Average score</th><td>{:.1}</td></tr>", s.average_score);
    let join = |items: Vec<String>| {
        if items.is_empty() {
            "-".to_string()
        } else {
            escape(&items.join(", "))
        }
    };
    let _ = writeln!(
        html,
        "<tr><th>Common issues</th><td>{}</td></tr>",
        join(s.common_issues.iter().map(|f| f.description().to_string()).collect())
    );
    let _ = writeln!(
        html,
        "<tr><th>Strengths</th><td>{}</td></tr>",
        join(s.strengths.iter().map(|e| e.to_string()).collect())
    );
    let _ = writeln!(
        html,
        "<tr><th>Areas for improvement</th><td>{}</td></tr></table>",
        join(s.areas_for_improvement.iter().map(|e| e.to_string()).collect())
    );

    for result in &session.results {
        render_result(&mut html, result);
    }

    let g = &session.global_recommendations;
    if !g.is_empty() {
        let _ = writeln!(html, "<h2>Program</h2><ul>");
        for e in &g.exercises {
            let _ = writeln!(
                html,
                "<li><b>{}</b> ({}) {}</li>",
                escape(&e.name),
                escape(&e.dosage),
                escape(&e.description)
            );
        }
        for m in &g.muscles {
            let _ = writeln!(html, "<li>{:?}: {}</li>", m.action, escape(&m.muscle));
        }
        for p in &g.patterns {
            let _ = writeln!(html, "<li>{}: <i>{}</i></li>", escape(&p.pattern), escape(&p.cue));
        }
        let _ = writeln!(html, "</ul>");
    }

    html.push_str("</body></html>\n");
    html
}

fn render_result(html: &mut String, r: &ExerciseAssessmentResult) {
    let _ = writeln!(
        html,
        "<h2>{}</h2>\n<p class=\"{}\">Score {} / 100 ({})</p>\n<p>{}</p>",
        escape(&r.exercise_name),
        r.status.as_str(),
        r.score,
        r.status.as_str(),
        escape(&r.summary)
    );

    if !r.deviations.is_empty() {
        let _ = writeln!(
            html,
            "<table><tr><th>Angle</th><th>Measured</th><th>Ideal</th><th>Status</th></tr>"
        );
        for d in &r.deviations {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{:.1}°</td><td>{:.1}°</td><td>{}</td></tr>",
                d.angle,
                d.measured,
                d.ideal,
                d.status.as_str()
            );
        }
        let _ = writeln!(html, "</table>");
    }

    if let Some(pain) = &r.reported_pain {
        let _ = writeln!(
            html,
            "<p>Reported pain: {} ({}/10)</p>",
            escape(&pain.location),
            pain.intensity
        );
    }
    for p in &r.probable_pains {
        let _ = writeln!(html, "<p>Risk: {} ({:?})</p>", escape(&p.location), p.likelihood);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Html,
    Pdf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedReport {
    pub format: ReportFormat,
    pub file_name: String,
    pub content: String,
}

/// Delivers a finalized session to its destination (file, share sheet, printer)
#[async_trait]
pub trait ReportExporter: Send + Sync {
    async fn export(
        &self,
        session: &AssessmentSession,
        format: ReportFormat,
    ) -> Result<ExportedReport>;
}

/// Renders JSON and HTML in process; PDF needs an external renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineReportExporter;

#[async_trait]
impl ReportExporter for InlineReportExporter {
    async fn export(
        &self,
        session: &AssessmentSession,
        format: ReportFormat,
    ) -> Result<ExportedReport> {
        let stamp = session.started_at.format("%Y%m%d-%H%M");
        let (content, extension) = match format {
            ReportFormat::Json => (export_json(session)?, "json"),
            ReportFormat::Html => (render_html(session), "html"),
            ReportFormat::Pdf => {
                return Err(Error::ExportUnavailable("no PDF renderer configured".to_string()));
            }
        };

        Ok(ExportedReport {
            format,
            file_name: format!("assessment-{}.{}", stamp, extension),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{manager, recording};
    use crate::session::{ReportedPain, SessionMode};
    use biomech_core::PatternFlag;

    fn finalized() -> AssessmentSession {
        let (_store, mut m) = manager();
        m.start_session(SessionMode::Full);
        m.record_exercise_result(recording("squat_hold", 100.0, &[PatternFlag::StaticKneeValgus]))
            .unwrap();
        let mut input = recording("wall_sit", 70.0, &[PatternFlag::StaticKneeValgus]);
        input.reported_pain = Some(ReportedPain {
            location: "Knee <left>".to_string(),
            intensity: 4,
            notes: Some("sharp".to_string()),
        });
        m.record_exercise_result(input).unwrap();
        m.end_session().unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let session = finalized();
        let json = export_json(&session).unwrap();
        let restored = import_json(&json).unwrap();

        assert_eq!(restored.results, session.results);
        assert_eq!(restored.summary, session.summary);
        assert_eq!(restored, session);
    }

    #[test]
    fn test_malformed_import() {
        assert!(import_json("{not json").is_none());
        assert!(import_json("{\"id\": 3}").is_none());
    }

    #[test]
    fn test_html_escapes() {
        let html = render_html(&finalized());
        assert!(html.contains("Squat Hold"));
        assert!(html.contains("Knee &lt;left&gt;"));
        assert!(!html.contains("<left>"));
        assert!(html.contains("Knee collapses inward"));
    }

    #[tokio::test]
    async fn test_inline_exporter() {
        let session = finalized();
        let exporter = InlineReportExporter;

        let report = exporter.export(&session, ReportFormat::Html).await.unwrap();
        assert!(report.file_name.ends_with(".html"));

        let pdf = exporter.export(&session, ReportFormat::Pdf).await;
        assert!(matches!(pdf, Err(Error::ExportUnavailable(_))));
    }
}
