use ratatui::prelude::*;
use ratatui::widgets::*;

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};

use crate::host::Host;

/// A host that survived the current filter, with highlight positions for
/// the name and target columns.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Visible {
    index: usize,
    name_hits: Vec<usize>,
    target_hits: Vec<usize>,
}

/// Fuzzy-filtered table of hosts. Holds indices into the registry, never
/// the records themselves.
pub struct SelectBox {
    state: TableState,
    rows: Vec<Visible>,
    pattern: String,
}

impl Default for SelectBox {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectBox {
    pub fn new() -> Self {
        Self {
            state: TableState::default().with_selected(0),
            rows: Vec::new(),
            pattern: String::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rebuilds the visible rows for `pattern`, best match first.
    pub fn refresh(&mut self, hosts: &[Host], pattern: &str) {
        let keep = self.selected(hosts).map(|h| h.name.clone());
        self.pattern = pattern.to_string();
        self.rows = filter(hosts, pattern);
        match keep {
            Some(name) if self.select_name(hosts, &name) => {}
            _ => self.clamp(),
        }
    }

    pub fn selected<'a>(&self, hosts: &'a [Host]) -> Option<&'a Host> {
        let row = self.rows.get(self.state.selected()?)?;
        hosts.get(row.index)
    }

    /// Moves the cursor onto `name`; false when it is filtered out.
    pub fn select_name(&mut self, hosts: &[Host], name: &str) -> bool {
        match self
            .rows
            .iter()
            .position(|row| hosts.get(row.index).map(|h| h.name.as_str()) == Some(name))
        {
            Some(position) => {
                self.state.select(Some(position));
                true
            }
            None => false,
        }
    }

    pub fn up(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.rows.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn down(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.rows.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    fn clamp(&mut self) {
        if self.rows.is_empty() {
            self.state.select(None);
        } else {
            let i = self.state.selected().unwrap_or(0).min(self.rows.len() - 1);
            self.state.select(Some(i));
        }
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect, hosts: &[Host]) {
        let header = Row::new(vec![
            Cell::from("Name"),
            Cell::from("Target"),
            Cell::from("Port"),
            Cell::from("Via"),
            Cell::from("Tags"),
        ])
        .style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .add_modifier(Modifier::UNDERLINED),
        );

        let rows: Vec<_> = self
            .rows
            .iter()
            .filter_map(|row| hosts.get(row.index).map(|host| (row, host)))
            .map(|(row, host)| {
                Row::new(vec![
                    Cell::from(Line::from(highlight_spans(&host.name, &row.name_hits))),
                    Cell::from(Line::from(highlight_spans(&host.target(), &row.target_hits))),
                    Cell::from(host.port.map(|p| p.to_string()).unwrap_or_default()),
                    Cell::from(host.bastion.clone().unwrap_or_default()),
                    Cell::from(host.tags.iter().cloned().collect::<Vec<_>>().join(",")),
                ])
            })
            .collect();

        let name_width = column_width(hosts, |h| h.name.clone(), 4);
        let target_width = column_width(hosts, |h| h.target(), 6);
        let title = if self.pattern.is_empty() {
            format!(" Hosts ({}) ", hosts.len())
        } else {
            format!(" Hosts ({}/{}) matching '{}' ", self.rows.len(), hosts.len(), self.pattern)
        };

        let table = Table::new(
            rows,
            [
                Constraint::Length(name_width + 1),
                Constraint::Length(target_width + 1),
                Constraint::Length(6),
                Constraint::Min(8),
                Constraint::Min(8),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_spacing(HighlightSpacing::Always);

        frame.render_stateful_widget(table, area, &mut self.state);
    }
}

/// Scores each host over name, target, tags and description; keeps only
/// matches, best first. An empty pattern keeps everything in order.
fn filter(hosts: &[Host], pattern: &str) -> Vec<Visible> {
    if pattern.is_empty() {
        return (0..hosts.len())
            .map(|index| Visible {
                index,
                name_hits: Vec::new(),
                target_hits: Vec::new(),
            })
            .collect();
    }

    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, Visible)> = hosts
        .iter()
        .enumerate()
        .filter_map(|(index, host)| {
            let haystack = format!(
                "{} {} {} {}",
                host.name,
                host.target(),
                host.tags.iter().cloned().collect::<Vec<_>>().join(" "),
                host.description.clone().unwrap_or_default()
            );
            let score = matcher.fuzzy_match(&haystack, pattern)?;
            let hits = |text: &str| {
                matcher
                    .fuzzy_indices(text, pattern)
                    .map(|(_, indices)| indices)
                    .unwrap_or_default()
            };
            Some((
                score,
                Visible {
                    index,
                    name_hits: hits(&host.name),
                    target_hits: hits(&host.target()),
                },
            ))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.index.cmp(&b.1.index)));
    scored.into_iter().map(|(_, row)| row).collect()
}

fn column_width(hosts: &[Host], text: impl Fn(&Host) -> String, min: u16) -> u16 {
    hosts
        .iter()
        .map(|h| unicode_width::UnicodeWidthStr::width(text(h).as_str()) as u16)
        .max()
        .unwrap_or(0)
        .max(min)
}

fn highlight_spans<'b>(input: &str, indices: &[usize]) -> Vec<Span<'b>> {
    let mut spans = Vec::new();
    let mut current_segment = String::new();

    let highlight_style = Style::default()
        .fg(Color::Rgb(250, 0, 0))
        .bg(Color::Rgb(0xFF, 0xFC, 0x67))
        .add_modifier(Modifier::BOLD);
    for (i, c) in input.chars().enumerate() {
        if indices.contains(&i) {
            if !current_segment.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_segment)));
            }
            spans.push(Span::styled(c.to_string(), highlight_style));
        } else {
            current_segment.push(c);
        }
    }

    if !current_segment.is_empty() {
        spans.push(Span::raw(current_segment));
    }

    spans
}
