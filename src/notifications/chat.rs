//! Native rich payloads for Slack, Discord and Microsoft Teams.

use serde_json::{json, Value};

use super::templates::TemplateData;

fn response_time(data: &TemplateData) -> String {
    data.response_time_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn status_code(data: &TemplateData) -> String {
    data.status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

fn title(data: &TemplateData) -> String {
    format!(
        "{} {} is {}",
        data.emoji,
        data.monitor_name,
        data.status.as_str().to_uppercase()
    )
}

pub fn slack_payload(data: &TemplateData, message: &str) -> Value {
    json!({
        "text": title(data),
        "attachments": [{
            "color": format!("#{:06X}", data.status.color()),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": title(data), "emoji": true }
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": message }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Monitor:*\n{}", data.monitor_name) },
                        { "type": "mrkdwn", "text": format!("*Status:*\n{}", data.status) },
                        { "type": "mrkdwn", "text": format!("*URL:*\n{}", data.monitor_url) },
                        { "type": "mrkdwn", "text": format!("*Response time:*\n{}", response_time(data)) },
                        { "type": "mrkdwn", "text": format!("*Status code:*\n{}", status_code(data)) }
                    ]
                },
                {
                    "type": "actions",
                    "elements": [{
                        "type": "button",
                        "text": { "type": "plain_text", "text": "View in dashboard" },
                        "url": data.dashboard_url
                    }]
                }
            ]
        }]
    })
}

pub fn discord_payload(data: &TemplateData, message: &str) -> Value {
    json!({
        "embeds": [{
            "title": title(data),
            "description": message,
            "url": data.dashboard_url,
            "color": data.status.color(),
            "fields": [
                { "name": "Monitor", "value": data.monitor_name, "inline": true },
                { "name": "Status", "value": data.status.as_str(), "inline": true },
                { "name": "URL", "value": data.monitor_url, "inline": false },
                { "name": "Response time", "value": response_time(data), "inline": true },
                { "name": "Status code", "value": status_code(data), "inline": true }
            ],
            "timestamp": data.timestamp.to_rfc3339()
        }]
    })
}

pub fn teams_payload(data: &TemplateData, message: &str) -> Value {
    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "themeColor": format!("{:06X}", data.status.color()),
        "summary": title(data),
        "sections": [{
            "activityTitle": title(data),
            "text": message,
            "facts": [
                { "name": "Monitor", "value": data.monitor_name },
                { "name": "Status", "value": data.status.as_str() },
                { "name": "URL", "value": data.monitor_url },
                { "name": "Response time", "value": response_time(data) },
                { "name": "Status code", "value": status_code(data) }
            ]
        }],
        "potentialAction": [{
            "@type": "OpenUri",
            "name": "View in dashboard",
            "targets": [{ "os": "default", "uri": data.dashboard_url }]
        }]
    })
}
