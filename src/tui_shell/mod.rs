use anyhow::Result;

mod app;
mod modal;
mod view;

pub fn run(rt: crate::tui::Runtime) -> Result<()> {
    app::run(rt)
}
