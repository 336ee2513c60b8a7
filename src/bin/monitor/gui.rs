use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use nalgebra::Matrix4;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, Paragraph},
    Frame, Terminal,
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

use ghosts::config::Rgba;
use ghosts::feature_map_quality::BarRenderer;

/// Chart bounds, in ring radii.
const BOUND: f64 = 2.0;

/// One snapshot of the mapping session, seen from above.
pub struct RingView {
    /// Floor position of every bar, in ring radii from the anchor, with its
    /// colour.
    pub bars: Vec<((f64, f64), Rgba)>,
    /// Direction of the camera from the anchor.
    pub camera: (f64, f64),
    pub overall_quality: f32,
    pub status: String,
}

/// Collects the bars of a quality ring as chart points.
pub struct ChartRenderer {
    center: (f64, f64),
    radius: f64,
    pub points: Vec<((f64, f64), Rgba)>,
}

impl ChartRenderer {
    pub fn new(center: (f64, f64), radius: f64) -> Self {
        Self {
            center,
            radius,
            points: Vec::new(),
        }
    }
}

impl BarRenderer for ChartRenderer {
    fn draw_bar(&mut self, model_matrix: &Matrix4<f32>, _scale: f32, color: &Rgba) {
        let x = (f64::from(model_matrix[(0, 3)]) - self.center.0) / self.radius;
        let z = (f64::from(model_matrix[(2, 3)]) - self.center.1) / self.radius;
        self.points.push(((x, z), *color));
    }
}

type ViewGenerator = Box<dyn FnMut() -> RingView>;

struct App {
    view_generator: ViewGenerator,
    bar_groups: Vec<(Color, Vec<(f64, f64)>)>,
    camera: Vec<(f64, f64)>,
    overall_quality: f32,
    status: String,
}

impl App {
    fn new(view_generator: ViewGenerator) -> App {
        App {
            view_generator,
            bar_groups: vec![],
            camera: vec![],
            overall_quality: 0.0,
            status: String::new(),
        }
    }

    fn on_tick(&mut self) {
        let view = (self.view_generator)();
        self.bar_groups.clear();
        for ((x, z), [r, g, b, _]) in view.bars {
            let color = Color::Rgb(r as u8, g as u8, b as u8);
            match self.bar_groups.iter_mut().find(|(c, _)| *c == color) {
                Some((_, points)) => points.push((x, z)),
                None => self.bar_groups.push((color, vec![(x, z)])),
            }
        }
        self.camera = vec![view.camera];
        self.overall_quality = view.overall_quality;
        self.status = view.status;
    }
}

pub fn engage_gui(view_generator: ViewGenerator, tick_rate: Duration) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let app = App::new(view_generator);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn axis(title: &str) -> Axis<'_> {
    Axis::default()
        .title(Span::styled(title, Style::default().fg(Color::Magenta)))
        .style(Style::default().fg(Color::White))
        .bounds([-BOUND, BOUND])
        .labels(
            ["-2", "-1", "0", "1", "2"]
                .iter()
                .cloned()
                .map(Span::from)
                .collect(),
        )
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.size());

    let mut datasets: Vec<Dataset> = app
        .bar_groups
        .iter()
        .map(|(color, points)| {
            Dataset::default()
                .marker(symbols::Marker::Block)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(*color))
                .data(points)
        })
        .collect();
    datasets.push(
        Dataset::default()
            .name("Camera")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Cyan))
            .data(&app.camera),
    );
    let chart = Chart::new(datasets)
        .block(Block::default().title("Quality ring, from above").borders(Borders::ALL))
        .x_axis(axis("X"))
        .y_axis(axis("Z"));
    f.render_widget(chart, chunks[0]);

    let ratio = f64::from(app.overall_quality).clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(Block::default().title("Overall quality").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(format!("{:.0}%", ratio * 100.0));
    f.render_widget(gauge, chunks[1]);

    let status = Paragraph::new(app.status.as_str())
        .block(Block::default().title("Status (q to quit)").borders(Borders::ALL));
    f.render_widget(status, chunks[2]);
}
