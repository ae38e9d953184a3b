use geotask_core::{Config, TaskId};

use crate::context::{open_database, print_json, CliResult};

pub fn run(task: Option<TaskId>) -> CliResult {
    let config = Config::load()?;
    let db = open_database(&config)?;
    print_json(&db.history(task)?)
}
