use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::UnicodeWidthStr;

use crate::api::{self, Comment, Post, User};
use crate::data::{self, CommentService, FeedService, PostService, UserService};

const TICK_RATE: Duration = Duration::from_millis(120);
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Screen-local fetch lifecycle. A state is never in two phases at once and
/// the payload only exists in `Ready`.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    Empty,
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// An empty collection is a legitimate ready outcome, distinct from failure.
fn collection_state<T>(items: Vec<T>) -> ViewState<Vec<T>> {
    if items.is_empty() {
        ViewState::Empty
    } else {
        ViewState::Ready(items)
    }
}

/// Named navigation surface. Route parameters carry everything a screen
/// needs to start its own fetches.
#[derive(Debug, Clone)]
pub enum Route {
    Home,
    PostDetail { id: i64, user_id: Option<i64> },
    UserProfile { user: User },
}

pub struct HomeState {
    pub posts: ViewState<Vec<Post>>,
    pub selected_post: usize,
    pub search_query: String,
    /// `None` while not searching; the list and the search results are
    /// mutually exclusive display modes.
    pub search_results: Option<ViewState<Vec<User>>>,
    pub selected_result: usize,
    pub search_focused: bool,
}

impl HomeState {
    fn new() -> Self {
        Self {
            posts: ViewState::Loading,
            selected_post: 0,
            search_query: String::new(),
            search_results: None,
            selected_result: 0,
            search_focused: false,
        }
    }
}

pub struct DetailState {
    pub post_id: i64,
    pub author_id: Option<i64>,
    pub post: ViewState<Post>,
    /// `None` when no author id was passed; the screen renders without an
    /// author section instead of treating that as an error.
    pub author: Option<ViewState<User>>,
    /// `None` until the comment action; once fetched, comments stay visible
    /// for the lifetime of the screen.
    pub comments: Option<ViewState<Vec<Comment>>>,
    pub scroll: u16,
}

impl DetailState {
    fn new(post_id: i64, author_id: Option<i64>) -> Self {
        Self {
            post_id,
            author_id,
            post: ViewState::Loading,
            author: author_id.map(|_| ViewState::Loading),
            comments: None,
            scroll: 0,
        }
    }
}

pub struct ProfileState {
    pub user: User,
    pub posts: ViewState<Vec<Post>>,
    pub selected_post: usize,
}

impl ProfileState {
    fn new(user: User) -> Self {
        Self {
            user,
            posts: ViewState::Loading,
            selected_post: 0,
        }
    }
}

pub enum Screen {
    Home(HomeState),
    Detail(DetailState),
    Profile(ProfileState),
}

impl Screen {
    fn title(&self) -> &'static str {
        match self {
            Screen::Home(_) => "Home",
            Screen::Detail(_) => "Post",
            Screen::Profile(_) => "Profile",
        }
    }
}

struct PendingFetch {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

impl PendingFetch {
    fn cancel(self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

struct PendingSearch {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

struct PendingKeyed {
    request_id: u64,
    key: i64,
    cancel_flag: Arc<AtomicBool>,
}

impl PendingKeyed {
    fn cancel(self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

enum AsyncResponse {
    HomePosts {
        request_id: u64,
        result: Result<Vec<Post>, api::Error>,
    },
    SearchUsers {
        request_id: u64,
        result: Result<Vec<User>, api::Error>,
    },
    ProfileUser {
        request_id: u64,
        result: Result<User, api::Error>,
    },
    PostBody {
        request_id: u64,
        post_id: i64,
        result: Result<Post, api::Error>,
    },
    PostAuthor {
        request_id: u64,
        user_id: i64,
        result: Result<User, api::Error>,
    },
    Comments {
        request_id: u64,
        post_id: i64,
        result: Result<Vec<Comment>, api::Error>,
    },
    UserPosts {
        request_id: u64,
        user_id: i64,
        result: Result<Vec<Post>, api::Error>,
    },
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        if self.last_tick.elapsed() < TICK_RATE {
            return false;
        }
        self.index = (self.index + 1) % SPINNER_FRAMES.len();
        self.last_tick = Instant::now();
        true
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Options {
    pub status_message: String,
    pub feed_service: Arc<dyn FeedService>,
    pub user_service: Arc<dyn UserService>,
    pub post_service: Arc<dyn PostService>,
    pub comment_service: Arc<dyn CommentService>,
    pub search_debounce: Duration,
    pub theme: String,
    pub config_path: String,
}

pub struct Model {
    screens: Vec<Screen>,
    status_message: String,
    feed_service: Arc<dyn FeedService>,
    user_service: Arc<dyn UserService>,
    post_service: Arc<dyn PostService>,
    comment_service: Arc<dyn CommentService>,
    search_debounce: Duration,
    search_input_at: Option<Instant>,
    accent: Color,
    config_path: String,
    spinner: Spinner,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    next_request_id: u64,
    pending_home_posts: Option<PendingFetch>,
    pending_search: Option<PendingSearch>,
    pending_profile_nav: Option<PendingFetch>,
    pending_post: Option<PendingKeyed>,
    pending_author: Option<PendingKeyed>,
    pending_comments: Option<PendingKeyed>,
    pending_user_posts: Option<PendingKeyed>,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let mut model = Model {
            screens: vec![Screen::Home(HomeState::new())],
            status_message: opts.status_message,
            feed_service: opts.feed_service,
            user_service: opts.user_service,
            post_service: opts.post_service,
            comment_service: opts.comment_service,
            search_debounce: opts.search_debounce,
            search_input_at: None,
            accent: accent_color(&opts.theme),
            config_path: opts.config_path,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
            next_request_id: 0,
            pending_home_posts: None,
            pending_search: None,
            pending_profile_nav: None,
            pending_post: None,
            pending_author: None,
            pending_comments: None,
            pending_user_posts: None,
        };
        model.reload_posts();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }
            self.maybe_start_search();

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = TICK_RATE
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break;
                    }
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= TICK_RATE {
                last_tick = Instant::now();
                if self.is_loading() && self.spinner.advance() {
                    self.mark_dirty();
                } else if !self.is_loading() {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.pending_home_posts.is_some()
            || self.pending_search.is_some()
            || self.pending_profile_nav.is_some()
            || self.pending_post.is_some()
            || self.pending_author.is_some()
            || self.pending_comments.is_some()
            || self.pending_user_posts.is_some()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn home_mut(&mut self) -> &mut HomeState {
        // The home screen is the permanent root of the stack.
        match &mut self.screens[0] {
            Screen::Home(state) => state,
            _ => unreachable!("home screen is always at the bottom of the stack"),
        }
    }

    fn home(&self) -> &HomeState {
        match &self.screens[0] {
            Screen::Home(state) => state,
            _ => unreachable!("home screen is always at the bottom of the stack"),
        }
    }

    fn top(&self) -> &Screen {
        self.screens.last().expect("screen stack is never empty")
    }

    fn top_mut(&mut self) -> &mut Screen {
        self.screens.last_mut().expect("screen stack is never empty")
    }

    fn detail_mut(&mut self, post_id: i64) -> Option<&mut DetailState> {
        self.screens.iter_mut().rev().find_map(|screen| match screen {
            Screen::Detail(state) if state.post_id == post_id => Some(state),
            _ => None,
        })
    }

    fn profile_mut(&mut self, user_id: i64) -> Option<&mut ProfileState> {
        self.screens.iter_mut().rev().find_map(|screen| match screen {
            Screen::Profile(state) if state.user.id == user_id => Some(state),
            _ => None,
        })
    }

    // ---- navigation ----

    pub fn navigate(&mut self, route: Route) {
        match route {
            Route::Home => {
                while self.screens.len() > 1 {
                    self.pop_screen();
                }
            }
            Route::PostDetail { id, user_id } => {
                self.screens.push(Screen::Detail(DetailState::new(id, user_id)));
                self.load_post(id);
                if let Some(author_id) = user_id {
                    self.load_author(author_id);
                }
            }
            Route::UserProfile { user } => {
                let user_id = user.id;
                self.screens.push(Screen::Profile(ProfileState::new(user)));
                self.load_user_posts(user_id);
            }
        }
        self.mark_dirty();
    }

    fn pop_screen(&mut self) {
        if self.screens.len() <= 1 {
            return;
        }
        let departing = self.screens.pop();
        // Cancel fetches owned by the departing screen so a late result is
        // discarded instead of applied to a dead view-state.
        match departing {
            Some(Screen::Detail(_)) => {
                if let Some(pending) = self.pending_post.take() {
                    pending.cancel();
                }
                if let Some(pending) = self.pending_author.take() {
                    pending.cancel();
                }
                if let Some(pending) = self.pending_comments.take() {
                    pending.cancel();
                }
            }
            Some(Screen::Profile(_)) => {
                if let Some(pending) = self.pending_user_posts.take() {
                    pending.cancel();
                }
            }
            _ => {}
        }
        self.mark_dirty();
    }

    // ---- fetch triggers ----

    fn reload_posts(&mut self) {
        if let Some(pending) = self.pending_home_posts.take() {
            pending.cancel();
        }

        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_home_posts = Some(PendingFetch {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.home_mut().posts = ViewState::Loading;
        self.status_message = "Loading posts...".to_string();
        self.spinner.reset();

        let tx = self.response_tx.clone();
        let service = self.feed_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.list_posts();
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::HomePosts { request_id, result });
        });
        self.mark_dirty();
    }

    /// Records a keystroke in the search box. The fetch itself only starts
    /// once the debounce window elapses, so fast typists supersede their own
    /// pending input instead of issuing a request per keystroke.
    fn on_search_input(&mut self) {
        if self.home().search_query.trim().is_empty() {
            // Back to list mode with no fetch.
            if let Some(pending) = self.pending_search.take() {
                pending.cancel_flag.store(true, Ordering::SeqCst);
            }
            self.search_input_at = None;
            let home = self.home_mut();
            home.search_results = None;
            home.selected_result = 0;
        } else {
            self.search_input_at = Some(Instant::now());
        }
        self.mark_dirty();
    }

    fn maybe_start_search(&mut self) {
        let Some(at) = self.search_input_at else {
            return;
        };
        if at.elapsed() < self.search_debounce {
            return;
        }
        self.search_input_at = None;
        self.start_search();
    }

    fn start_search(&mut self) {
        if self.home().search_query.trim().is_empty() {
            return;
        }
        if let Some(pending) = self.pending_search.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }

        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_search = Some(PendingSearch {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });
        let home = self.home_mut();
        home.search_results = Some(ViewState::Loading);
        home.selected_result = 0;

        let tx = self.response_tx.clone();
        let service = self.user_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.list_users();
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::SearchUsers { request_id, result });
        });
        self.mark_dirty();
    }

    /// Search hit selected: fetch the full user record, then navigate to the
    /// profile with it as the route parameter.
    fn open_search_result(&mut self) {
        let home = self.home();
        let Some(ViewState::Ready(results)) = &home.search_results else {
            return;
        };
        let Some(user) = results.get(home.selected_result) else {
            return;
        };
        let user_id = user.id;

        if let Some(pending) = self.pending_profile_nav.take() {
            pending.cancel();
        }
        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_profile_nav = Some(PendingFetch {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.status_message = "Opening profile...".to_string();

        let tx = self.response_tx.clone();
        let service = self.user_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.get_user(user_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::ProfileUser { request_id, result });
        });
        self.mark_dirty();
    }

    fn open_selected_post(&mut self) {
        let home = self.home();
        let Some(posts) = home.posts.ready() else {
            return;
        };
        let Some(post) = posts.get(home.selected_post) else {
            return;
        };
        // No fetch here; the detail screen loads lazily from its own params.
        let route = Route::PostDetail {
            id: post.id,
            user_id: Some(post.user_id),
        };
        self.navigate(route);
    }

    fn load_post(&mut self, post_id: i64) {
        if let Some(pending) = self.pending_post.take() {
            pending.cancel();
        }
        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_post = Some(PendingKeyed {
            request_id,
            key: post_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.spinner.reset();

        let tx = self.response_tx.clone();
        let service = self.post_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.get_post(post_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::PostBody {
                request_id,
                post_id,
                result,
            });
        });
    }

    fn load_author(&mut self, user_id: i64) {
        if let Some(pending) = self.pending_author.take() {
            pending.cancel();
        }
        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_author = Some(PendingKeyed {
            request_id,
            key: user_id,
            cancel_flag: cancel_flag.clone(),
        });

        let tx = self.response_tx.clone();
        let service = self.user_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.get_user(user_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::PostAuthor {
                request_id,
                user_id,
                result,
            });
        });
    }

    /// Comments are fetched only on the explicit comment action; once
    /// fetched they stay for the lifetime of the screen instance.
    fn trigger_comments(&mut self) {
        let Screen::Detail(detail) = self.top_mut() else {
            return;
        };
        if detail.comments.is_some() {
            return;
        }
        let post_id = detail.post_id;
        detail.comments = Some(ViewState::Loading);

        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_comments = Some(PendingKeyed {
            request_id,
            key: post_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.status_message = "Loading comments...".to_string();

        let tx = self.response_tx.clone();
        let service = self.comment_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.comments_for_post(post_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Comments {
                request_id,
                post_id,
                result,
            });
        });
        self.mark_dirty();
    }

    fn load_user_posts(&mut self, user_id: i64) {
        if let Some(pending) = self.pending_user_posts.take() {
            pending.cancel();
        }
        let request_id = self.next_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_user_posts = Some(PendingKeyed {
            request_id,
            key: user_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.spinner.reset();

        let tx = self.response_tx.clone();
        let service = self.feed_service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.posts_by_user(user_id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::UserPosts {
                request_id,
                user_id,
                result,
            });
        });
    }

    // ---- async plumbing ----

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::HomePosts { request_id, result } => {
                let Some(pending) = &self.pending_home_posts else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst) || pending.request_id != request_id {
                    return;
                }
                self.pending_home_posts = None;

                match result {
                    Ok(posts) => {
                        let count = posts.len();
                        let home = self.home_mut();
                        home.posts = collection_state(posts);
                        home.selected_post = 0;
                        self.status_message = format!("Loaded {count} posts.");
                    }
                    Err(err) => {
                        self.home_mut().posts = ViewState::Failed(err.to_string());
                        self.status_message = format!("Failed to load posts: {err}");
                    }
                }
                self.mark_dirty();
            }
            AsyncResponse::SearchUsers { request_id, result } => {
                let Some(pending) = &self.pending_search else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst) || pending.request_id != request_id {
                    return;
                }
                self.pending_search = None;

                let query = self.home().search_query.clone();
                if query.trim().is_empty() {
                    // The box was cleared while the fetch was in flight.
                    self.home_mut().search_results = None;
                    return;
                }
                match result {
                    Ok(users) => {
                        let matches = data::filter_users(&users, &query);
                        let home = self.home_mut();
                        home.search_results = Some(collection_state(matches));
                        home.selected_result = 0;
                    }
                    Err(err) => {
                        self.home_mut().search_results =
                            Some(ViewState::Failed(err.to_string()));
                        self.status_message = format!("Failed to search users: {err}");
                    }
                }
                self.mark_dirty();
            }
            AsyncResponse::ProfileUser { request_id, result } => {
                let Some(pending) = &self.pending_profile_nav else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst) || pending.request_id != request_id {
                    return;
                }
                self.pending_profile_nav = None;

                match result {
                    Ok(user) => {
                        self.status_message = format!("Viewing {}.", user.name);
                        self.navigate(Route::UserProfile { user });
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to open profile: {err}");
                    }
                }
                self.mark_dirty();
            }
            AsyncResponse::PostBody {
                request_id,
                post_id,
                result,
            } => {
                let Some(pending) = &self.pending_post else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst)
                    || pending.request_id != request_id
                    || pending.key != post_id
                {
                    return;
                }
                self.pending_post = None;

                let state = match result {
                    Ok(post) => ViewState::Ready(post),
                    Err(err) => {
                        self.status_message = format!("Failed to load post: {err}");
                        ViewState::Failed(err.to_string())
                    }
                };
                if let Some(detail) = self.detail_mut(post_id) {
                    detail.post = state;
                }
                self.mark_dirty();
            }
            AsyncResponse::PostAuthor {
                request_id,
                user_id,
                result,
            } => {
                let Some(pending) = &self.pending_author else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst)
                    || pending.request_id != request_id
                    || pending.key != user_id
                {
                    return;
                }
                self.pending_author = None;

                // The author slice fails independently; the post stays
                // readable either way.
                let state = match result {
                    Ok(user) => ViewState::Ready(user),
                    Err(err) => ViewState::Failed(err.to_string()),
                };
                let detail = self.screens.iter_mut().rev().find_map(|screen| match screen {
                    Screen::Detail(d) if d.author_id == Some(user_id) => Some(d),
                    _ => None,
                });
                if let Some(detail) = detail {
                    detail.author = Some(state);
                }
                self.mark_dirty();
            }
            AsyncResponse::Comments {
                request_id,
                post_id,
                result,
            } => {
                let Some(pending) = &self.pending_comments else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst)
                    || pending.request_id != request_id
                    || pending.key != post_id
                {
                    return;
                }
                self.pending_comments = None;

                let state = match result {
                    Ok(comments) => {
                        self.status_message = format!("{} comments.", comments.len());
                        collection_state(comments)
                    }
                    Err(err) => {
                        self.status_message = format!("Failed to load comments: {err}");
                        ViewState::Failed(err.to_string())
                    }
                };
                if let Some(detail) = self.detail_mut(post_id) {
                    detail.comments = Some(state);
                }
                self.mark_dirty();
            }
            AsyncResponse::UserPosts {
                request_id,
                user_id,
                result,
            } => {
                let Some(pending) = &self.pending_user_posts else {
                    return;
                };
                if pending.cancel_flag.load(Ordering::SeqCst)
                    || pending.request_id != request_id
                    || pending.key != user_id
                {
                    return;
                }
                self.pending_user_posts = None;

                let state = match result {
                    Ok(posts) => collection_state(posts),
                    Err(err) => {
                        self.status_message = format!("Failed to load posts: {err}");
                        ViewState::Failed(err.to_string())
                    }
                };
                if let Some(profile) = self.profile_mut(user_id) {
                    profile.posts = state;
                    profile.selected_post = 0;
                }
                self.mark_dirty();
            }
        }
    }

    // ---- input ----

    /// Returns true when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let searching = matches!(self.top(), Screen::Home(home) if home.search_focused);
        if searching {
            self.handle_search_key(code);
            return false;
        }

        match self.top() {
            Screen::Home(_) => self.handle_home_key(code),
            Screen::Detail(_) => self.handle_detail_key(code),
            Screen::Profile(_) => self.handle_profile_key(code),
        }
    }

    fn handle_search_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                let home = self.home_mut();
                home.search_focused = false;
                home.search_query.clear();
                self.on_search_input();
            }
            KeyCode::Enter => {
                self.open_search_result();
            }
            KeyCode::Up => {
                let home = self.home_mut();
                home.selected_result = home.selected_result.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Down => {
                let len = match &self.home().search_results {
                    Some(ViewState::Ready(results)) => results.len(),
                    _ => 0,
                };
                let home = self.home_mut();
                if len > 0 {
                    home.selected_result = (home.selected_result + 1).min(len - 1);
                }
                self.mark_dirty();
            }
            KeyCode::Backspace => {
                self.home_mut().search_query.pop();
                self.on_search_input();
            }
            KeyCode::Char(c) => {
                self.home_mut().search_query.push(c);
                self.on_search_input();
            }
            _ => {}
        }
    }

    fn handle_home_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('/') => {
                self.home_mut().search_focused = true;
                self.mark_dirty();
            }
            KeyCode::Char('r') => self.reload_posts(),
            KeyCode::Char('j') | KeyCode::Down => {
                let len = self.home().posts.ready().map_or(0, Vec::len);
                let home = self.home_mut();
                if len > 0 {
                    home.selected_post = (home.selected_post + 1).min(len - 1);
                }
                self.mark_dirty();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                let home = self.home_mut();
                home.selected_post = home.selected_post.saturating_sub(1);
                self.mark_dirty();
            }
            KeyCode::Enter => self.open_selected_post(),
            _ => {}
        }
        false
    }

    fn handle_detail_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('c') => self.trigger_comments(),
            KeyCode::Char('j') | KeyCode::Down => {
                if let Screen::Detail(detail) = self.top_mut() {
                    detail.scroll = detail.scroll.saturating_add(1);
                }
                self.mark_dirty();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Screen::Detail(detail) = self.top_mut() {
                    detail.scroll = detail.scroll.saturating_sub(1);
                }
                self.mark_dirty();
            }
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Backspace => self.pop_screen(),
            _ => {}
        }
        false
    }

    fn handle_profile_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => {
                let len = match self.top() {
                    Screen::Profile(profile) => profile.posts.ready().map_or(0, Vec::len),
                    _ => 0,
                };
                if let Screen::Profile(profile) = self.top_mut() {
                    if len > 0 {
                        profile.selected_post = (profile.selected_post + 1).min(len - 1);
                    }
                }
                self.mark_dirty();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Screen::Profile(profile) = self.top_mut() {
                    profile.selected_post = profile.selected_post.saturating_sub(1);
                }
                self.mark_dirty();
            }
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Backspace => self.pop_screen(),
            _ => {}
        }
        false
    }

    // ---- rendering ----

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(frame.size());

        self.draw_title_bar(frame, chunks[0]);
        match self.top() {
            Screen::Home(_) => self.draw_home(frame, chunks[1]),
            Screen::Detail(_) => self.draw_detail(frame, chunks[1]),
            Screen::Profile(_) => self.draw_profile(frame, chunks[1]),
        }
        self.draw_status_bar(frame, chunks[2]);
    }

    fn draw_title_bar(&self, frame: &mut Frame, area: Rect) {
        let title = format!(" Feedr · {} ", self.top().title());
        let right = format!("cfg: {} ", self.config_path);
        let gap = (area.width as usize)
            .saturating_sub(title.width())
            .saturating_sub(right.width());
        let line = Line::from(vec![
            Span::styled(
                title,
                Style::default().fg(self.accent).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" ".repeat(gap)),
            Span::styled(right, Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_status_bar(&self, frame: &mut Frame, area: Rect) {
        let hint = match self.top() {
            Screen::Home(home) if home.search_focused => "Enter: open · Esc: clear",
            Screen::Home(_) => "j/k: move · Enter: open · /: search · r: refresh · q: quit",
            Screen::Detail(_) => "c: comments · j/k: scroll · Esc: back · q: quit",
            Screen::Profile(_) => "j/k: move · Esc: back · q: quit",
        };
        let status = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
        } else {
            self.status_message.clone()
        };
        let gap = (area.width as usize)
            .saturating_sub(status.width())
            .saturating_sub(hint.width() + 1);
        let line = Line::from(vec![
            Span::raw(status),
            Span::raw(" ".repeat(gap.max(1))),
            Span::styled(hint, Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_home(&self, frame: &mut Frame, area: Rect) {
        let home = self.home();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(1)])
            .split(area);

        let search_style = if home.search_focused {
            Style::default().fg(self.accent)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let search_text = if home.search_query.is_empty() && !home.search_focused {
            Span::styled("Search users...", Style::default().fg(Color::DarkGray))
        } else {
            Span::raw(home.search_query.clone())
        };
        let search = Paragraph::new(Line::from(search_text)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(search_style)
                .title(" Search "),
        );
        frame.render_widget(search, chunks[0]);

        // Search results and the post list are mutually exclusive modes,
        // keyed on whether the query is non-empty.
        if !home.search_query.trim().is_empty() {
            self.draw_search_results(frame, chunks[1], home);
        } else {
            self.draw_post_list(frame, chunks[1], home);
        }
    }

    fn draw_post_list(&self, frame: &mut Frame, area: Rect, home: &HomeState) {
        let block = Block::default().borders(Borders::ALL).title(" Posts ");
        match &home.posts {
            ViewState::Loading => {
                let text = format!("{} Loading posts...", self.spinner.frame());
                frame.render_widget(Paragraph::new(text).block(block), area);
            }
            ViewState::Failed(message) => {
                let text = Line::from(Span::styled(
                    format!("Could not load posts: {message}"),
                    Style::default().fg(Color::Red),
                ));
                frame.render_widget(Paragraph::new(text).block(block), area);
            }
            ViewState::Empty => {
                frame.render_widget(Paragraph::new("No posts available.").block(block), area);
            }
            ViewState::Ready(posts) => {
                let items: Vec<ListItem> = posts
                    .iter()
                    .map(|post| {
                        ListItem::new(Line::from(vec![
                            Span::styled(
                                post.title.clone(),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                            Span::styled(
                                format!("  · user {}", post.user_id),
                                Style::default().fg(Color::DarkGray),
                            ),
                        ]))
                    })
                    .collect();
                let list = List::new(items).block(block).highlight_style(
                    Style::default()
                        .fg(self.accent)
                        .add_modifier(Modifier::BOLD),
                );
                let mut state = ListState::default();
                state.select(Some(home.selected_post));
                frame.render_stateful_widget(list, area, &mut state);
            }
        }
    }

    fn draw_search_results(&self, frame: &mut Frame, area: Rect, home: &HomeState) {
        let block = Block::default().borders(Borders::ALL).title(" Users ");
        match &home.search_results {
            None | Some(ViewState::Loading) => {
                let text = format!("{} Searching users...", self.spinner.frame());
                frame.render_widget(Paragraph::new(text).block(block), area);
            }
            Some(ViewState::Failed(message)) => {
                let text = Line::from(Span::styled(
                    format!("Could not search users: {message}"),
                    Style::default().fg(Color::Red),
                ));
                frame.render_widget(Paragraph::new(text).block(block), area);
            }
            Some(ViewState::Empty) => {
                frame.render_widget(Paragraph::new("No users found.").block(block), area);
            }
            Some(ViewState::Ready(users)) => {
                let items: Vec<ListItem> = users
                    .iter()
                    .map(|user| {
                        ListItem::new(Line::from(vec![
                            Span::styled(
                                user.name.clone(),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                            Span::styled(
                                format!("  {}", user.email),
                                Style::default().fg(Color::DarkGray),
                            ),
                        ]))
                    })
                    .collect();
                let list = List::new(items).block(block).highlight_style(
                    Style::default()
                        .fg(self.accent)
                        .add_modifier(Modifier::BOLD),
                );
                let mut state = ListState::default();
                state.select(Some(home.selected_result));
                frame.render_stateful_widget(list, area, &mut state);
            }
        }
    }

    fn draw_detail(&self, frame: &mut Frame, area: Rect) {
        let Screen::Detail(detail) = self.top() else {
            return;
        };
        let width = area.width.saturating_sub(4).max(20) as usize;
        let mut lines: Vec<Line> = Vec::new();

        // Author header degrades to a blank line while pending or skipped.
        match &detail.author {
            Some(ViewState::Ready(user)) => {
                lines.push(Line::from(Span::styled(
                    user.name.clone(),
                    Style::default().fg(self.accent).add_modifier(Modifier::BOLD),
                )));
            }
            Some(ViewState::Loading) => {
                lines.push(Line::from(Span::styled(
                    "…",
                    Style::default().fg(Color::DarkGray),
                )));
            }
            Some(ViewState::Failed(_)) | Some(ViewState::Empty) | None => {
                lines.push(Line::from(""));
            }
        }
        lines.push(Line::from(""));

        match &detail.post {
            ViewState::Loading => {
                lines.push(Line::from(format!(
                    "{} Loading post...",
                    self.spinner.frame()
                )));
            }
            ViewState::Failed(message) => {
                lines.push(Line::from(Span::styled(
                    format!("Could not load post: {message}"),
                    Style::default().fg(Color::Red),
                )));
            }
            ViewState::Empty => {
                lines.push(Line::from("Post unavailable."));
            }
            ViewState::Ready(post) => {
                for wrapped in textwrap::wrap(&post.title, width) {
                    lines.push(Line::from(Span::styled(
                        wrapped.into_owned(),
                        Style::default().add_modifier(Modifier::BOLD),
                    )));
                }
                lines.push(Line::from(""));
                for wrapped in textwrap::wrap(&post.body, width) {
                    lines.push(Line::from(wrapped.into_owned()));
                }
            }
        }

        if let Some(comments) = &detail.comments {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Comments",
                Style::default().fg(self.accent).add_modifier(Modifier::BOLD),
            )));
            match comments {
                ViewState::Loading => {
                    lines.push(Line::from(format!(
                        "{} Loading comments...",
                        self.spinner.frame()
                    )));
                }
                ViewState::Failed(message) => {
                    lines.push(Line::from(Span::styled(
                        format!("Could not load comments: {message}"),
                        Style::default().fg(Color::Red),
                    )));
                }
                ViewState::Empty => {
                    lines.push(Line::from("No comments yet."));
                }
                ViewState::Ready(comments) => {
                    for comment in comments {
                        lines.push(Line::from(""));
                        lines.push(Line::from(vec![
                            Span::styled(
                                comment.name.clone(),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                            Span::styled(
                                format!("  {}", comment.email),
                                Style::default().fg(Color::DarkGray),
                            ),
                        ]));
                        for wrapped in textwrap::wrap(&comment.body, width) {
                            lines.push(Line::from(wrapped.into_owned()));
                        }
                    }
                }
            }
        }

        let block = Block::default().borders(Borders::ALL).title(" Post ");
        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((detail.scroll, 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_profile(&self, frame: &mut Frame, area: Rect) {
        let Screen::Profile(profile) = self.top() else {
            return;
        };
        let user = &profile.user;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(8), Constraint::Min(1)])
            .split(area);

        let info_lines = vec![
            Line::from(vec![
                Span::styled(
                    user.name.clone(),
                    Style::default().fg(self.accent).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {}", user.company.name),
                    Style::default().fg(Color::DarkGray),
                ),
            ]),
            Line::from(""),
            Line::from(format!("Email:   {}", user.email)),
            Line::from(format!("Phone:   {}", user.phone)),
            Line::from(format!("Website: {}", user.website)),
            Line::from(format!(
                "Address: {}, {} · {}, {}",
                user.address.suite, user.address.street, user.address.city, user.address.zipcode
            )),
        ];
        let info = Paragraph::new(info_lines)
            .block(Block::default().borders(Borders::ALL).title(" Profile "))
            .wrap(Wrap { trim: false });
        frame.render_widget(info, chunks[0]);

        let title = format!(" Posts by {} ", user.name);
        let block = Block::default().borders(Borders::ALL).title(title);
        match &profile.posts {
            ViewState::Loading => {
                let text = format!("{} Loading posts...", self.spinner.frame());
                frame.render_widget(Paragraph::new(text).block(block), chunks[1]);
            }
            ViewState::Failed(message) => {
                let text = Line::from(Span::styled(
                    format!("Could not load posts: {message}"),
                    Style::default().fg(Color::Red),
                ));
                frame.render_widget(Paragraph::new(text).block(block), chunks[1]);
            }
            ViewState::Empty => {
                frame.render_widget(
                    Paragraph::new("No posts yet.").block(block),
                    chunks[1],
                );
            }
            ViewState::Ready(posts) => {
                let width = chunks[1].width.saturating_sub(4).max(20) as usize;
                let items: Vec<ListItem> = posts
                    .iter()
                    .map(|post| {
                        let mut lines = vec![Line::from(Span::styled(
                            post.title.clone(),
                            Style::default().add_modifier(Modifier::BOLD),
                        ))];
                        for wrapped in textwrap::wrap(&post.body, width) {
                            lines.push(Line::from(Span::styled(
                                wrapped.into_owned(),
                                Style::default().fg(Color::Gray),
                            )));
                        }
                        lines.push(Line::from(""));
                        ListItem::new(lines)
                    })
                    .collect();
                let list = List::new(items).block(block).highlight_style(
                    Style::default()
                        .fg(self.accent)
                        .add_modifier(Modifier::BOLD),
                );
                let mut state = ListState::default();
                state.select(Some(profile.selected_post));
                frame.render_stateful_widget(list, chunks[1], &mut state);
            }
        }
    }
}

fn accent_color(theme: &str) -> Color {
    match theme {
        "plain" => Color::White,
        "amber" => Color::Yellow,
        _ => Color::Cyan,
    }
}
