use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, Wrap};
use solana_sdk::signature::Signer;

use crate::app::{self, App, Screen};

fn format_duration(secs: i64) -> String {
    if secs < 0 { return "0s".into(); }
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;
    if days > 0 {
        if hours > 0 { format!("{}d {}h", days, hours) } else { format!("{}d", days) }
    } else if hours > 0 {
        if mins > 0 { format!("{}h {}m", hours, mins) } else { format!("{}h", hours) }
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}

/// "Starting in", "Ending in" or "Ended" for a group's date guards.
fn countdown(app: &App, label: &str) -> String {
    let Some(guards) = app.group_guards(label) else {
        return String::new();
    };
    let now = app.now();
    if let Some(start) = guards.start_date.filter(|g| g.date > now) {
        return format!("Starting in {}", format_duration(start.date - now));
    }
    match guards.end_date {
        Some(end) if end.date > now => format!("Ending in {}", format_duration(end.date - now)),
        Some(_) => "Ended".into(),
        None => "Live".into(),
    }
}

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // title bar
            Constraint::Min(10),   // main content
            Constraint::Length(3),  // action bar
            Constraint::Length(6), // message log
        ])
        .split(frame.area());

    draw_title_bar(frame, app, chunks[0]);

    match app.screen {
        Screen::Dashboard => draw_dashboard(frame, app, chunks[1]),
        Screen::Form => draw_form(frame, app, chunks[1]),
        Screen::Confirm => draw_confirm(frame, app, chunks[1]),
        Screen::Result => draw_result(frame, app, chunks[1]),
    }

    draw_action_bar(frame, app, chunks[2]);
    draw_message_log(frame, app, chunks[3]);
}

fn draw_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let header = app.settings.header_text.as_deref().unwrap_or("Candy Mint");
    let wallet = app::short_pubkey(&app.keypair.pubkey());
    let balance = app
        .wallet
        .as_ref()
        .and_then(|w| w.sol_balance.as_ref().ok())
        .map(|l| format!("{} SOL", app::lamports_to_sol(*l)))
        .unwrap_or_else(|| "? SOL".into());
    let refresh_str = app
        .last_refresh
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".into());

    let title = format!(
        " {} | {} | {} | Last refresh: {} ",
        header, wallet, balance, refresh_str,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, area);
}

fn draw_dashboard(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(5)])
        .split(area);

    draw_machine_panel(frame, app, chunks[0]);
    draw_groups_panel(frame, app, chunks[1]);
}

fn draw_machine_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Candy Machine ")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(loaded) = &app.machine else {
        let text = Paragraph::new("  Candy machine not loaded. Press [r] to retry.");
        frame.render_widget(text, inner);
        return;
    };
    let cm = &loaded.machine;

    let remaining_style = if cm.is_sold_out() {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    };
    let mut lines = vec![
        Line::from(format!("  Address: {}", loaded.address)),
        Line::from(vec![
            Span::raw("  Items: "),
            Span::styled(
                format!("{}/{}", cm.items_remaining(), cm.data.items_available),
                remaining_style,
            ),
            Span::raw(" remaining"),
            Span::styled(
                if cm.is_sold_out() { "  SOLD OUT" } else { "" },
                Style::default().fg(Color::Red),
            ),
        ]),
    ];
    if !app.warnings.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  {} configuration warning(s), see log", app.warnings.len()),
            Style::default().fg(Color::Yellow),
        )));
    }
    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn draw_groups_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Mint Groups ({}) ", app.groups.len()))
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.groups.is_empty() {
        let text = Paragraph::new("  No guard groups found.");
        frame.render_widget(text, inner);
        return;
    }

    let header = Row::new(vec!["", "Group", "Price", "Window", "Max", "Status"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(0);

    let rows: Vec<Row> = app
        .groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let selected = i == app.group_cursor;
            let marker = if selected { ">" } else { " " };
            let text = app.settings.text(&g.label);
            let name = text
                .and_then(|t| t.header.clone())
                .unwrap_or_else(|| g.label.clone());
            let price = text
                .and_then(|t| t.mint_text.clone())
                .or_else(|| app.group_guards(&g.label).map(|gs| app::price_label(&gs)))
                .unwrap_or_default();
            let (status, color) = if let Some(loading) = &g.loading_text {
                (loading.clone(), Color::Cyan)
            } else if g.allowed {
                let button = text
                    .and_then(|t| t.button_label.clone())
                    .unwrap_or_else(|| "Eligible".into());
                (button, Color::Green)
            } else {
                (g.reason.clone().unwrap_or_else(|| "Not eligible".into()), Color::Red)
            };

            let base = if selected {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Row::new(vec![
                Line::from(marker),
                Line::from(name),
                Line::from(price),
                Line::from(countdown(app, &g.label)),
                Line::from(g.max_amount.to_string()),
                Line::from(Span::styled(status, Style::default().fg(color))),
            ])
            .style(base)
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Min(14),
        Constraint::Length(20),
        Constraint::Length(20),
        Constraint::Length(5),
        Constraint::Min(24),
    ];

    let table = Table::new(rows, widths).header(header);
    frame.render_widget(table, inner);
}

fn draw_form(frame: &mut Frame, app: &App, area: Rect) {
    let label = app.selected_group().map(|g| g.label.clone()).unwrap_or_default();
    let max = app.selected_group().map_or(0, |g| g.max_amount);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Mint from {} ", label))
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let valid = app::parse_quantity(&app.input_buf, max).is_some();
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  You can mint up to {} right now.", max),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled(
                "  Quantity: ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{}_", app.input_buf),
                Style::default().fg(if valid { Color::White } else { Color::Red }),
            ),
        ]),
    ];

    let para = Paragraph::new(Text::from(lines));
    frame.render_widget(para, inner);
}

fn draw_confirm(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Confirm Mint ")
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = vec![Line::from("")];

    if let Some(prepared) = &app.pending {
        let batch = &prepared.batch;
        lines.push(Line::from(format!("  Group: {}", batch.label)));
        lines.push(Line::from(format!("  Transactions: {}", batch.mints.len())));
        lines.push(Line::from(format!("  Compute units: {} each", batch.compute_units)));
        lines.push(Line::from(format!(
            "  Priority fee: {} micro-lamports/CU",
            app.config.micro_lamports
        )));
        if app.config.tip {
            lines.push(Line::from("  Includes a tip transfer"));
        }
        if let Some(sig) = &prepared.proof_signature {
            lines.push(Line::from(format!("  Allow list proof: {}", sig)));
        }
        lines.push(Line::from(""));
        for m in &batch.mints {
            lines.push(Line::from(format!("  New mint: {}", m.mint_address())));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Press [Y] to sign and send, [N] or [Esc] to cancel",
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )));

    let para = Paragraph::new(Text::from(lines));
    frame.render_widget(para, inner);
}

fn draw_result(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Mint Result ")
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = vec![Line::from("")];

    if let Some(report) = &app.last_report {
        lines.push(Line::from(Span::styled(
            format!("  Minted {} NFT(s) from {}", report.minted.len(), report.label),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
        if !report.failed.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("  {} transaction(s) failed", report.failed.len()),
                Style::default().fg(Color::Red),
            )));
        }
        for asset in &report.minted {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("  {}", asset.display_name()),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("    Mint: {}", asset.mint)));
            lines.push(Line::from(format!("    Signature: {}", asset.signature)));
            if let Some(md) = &asset.off_chain_metadata {
                if let Some(image) = &md.image {
                    lines.push(Line::from(format!("    Image: {}", image)));
                }
                if !md.attributes.is_empty() {
                    let traits: Vec<String> = md
                        .attributes
                        .iter()
                        .map(|a| match &a.value {
                            serde_json::Value::String(s) => format!("{}: {}", a.trait_type, s),
                            v => format!("{}: {}", a.trait_type, v),
                        })
                        .collect();
                    lines.push(Line::from(format!("    Traits: {}", traits.join(", "))));
                }
            }
            if let Some(err) = &asset.metadata_error {
                lines.push(Line::from(Span::styled(
                    format!("    Metadata unavailable: {}", err),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
    }

    let para = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    frame.render_widget(para, inner);
}

fn draw_action_bar(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Actions ")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let line = match app.screen {
        Screen::Form => Line::from(vec![
            action_key("[Enter]"), action_label("Build  "),
            action_key("[+/-]"), action_label("Adjust  "),
            action_key("[Esc]"), action_label("Cancel"),
        ]),
        Screen::Confirm => Line::from(vec![
            action_key("[Y]"), action_label("Sign & send  "),
            action_key("[N]"), action_label("Cancel"),
        ]),
        Screen::Result => Line::from(vec![action_label("Press any key to continue")]),
        Screen::Dashboard => {
            let mut spans = Vec::new();
            if app.selected_group().is_some_and(|g| g.allowed) {
                spans.extend([action_key("[m]"), action_label("int  ")]);
            }
            spans.extend([action_key("[j/k]"), action_label("select  ")]);
            spans.extend([action_key("[r]"), action_label("efresh  ")]);
            spans.extend([action_key("[q]"), action_label("uit")]);
            Line::from(spans)
        }
    };

    let para = Paragraph::new(Text::from(vec![line]));
    frame.render_widget(para, inner);
}

fn action_key(key: &str) -> Span<'_> {
    Span::styled(key, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
}

fn action_label(label: &str) -> Span<'_> {
    Span::styled(label, Style::default().fg(Color::White))
}

fn draw_message_log(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Log ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = app
        .message_log
        .iter()
        .map(|m| Line::from(format!(" > {}", m)))
        .collect();

    let width = inner.width as usize;
    let total_rows: usize = lines
        .iter()
        .map(|line| {
            let len = line.width();
            if width == 0 { 1 } else { 1_usize.max(len.div_ceil(width)) }
        })
        .sum();

    let visible = inner.height;
    let scroll = (total_rows as u16).saturating_sub(visible);

    let para = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(para, inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_use_two_largest_units() {
        assert_eq!(format_duration(90_061), "1d 1h");
        assert_eq!(format_duration(3_660), "1h 1m");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(-5), "0s");
    }
}
