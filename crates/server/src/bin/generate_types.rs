use std::{fs, path::PathBuf};

use anyhow::{Context, bail};
use db::models::{
    comment::{Comment, CreateComment, UpdateComment},
    project::{CreateProject, Project, ProjectWithTags, UpdateProject},
    tag::{CreateTag, Tag, UpdateTag},
    task::{CreateTask, Task, TaskPriority, TaskStatus, TaskWithRelations, UpdateTask},
    user::{CreateUser, UpdateUser, User},
};
use server::response::ApiResponse;
use ts_rs::TS;

const HEADER: &str = "// This file was generated by `generate_types`. Do not edit it by hand.\n";

fn generate() -> String {
    let decls = [
        User::decl(),
        CreateUser::decl(),
        UpdateUser::decl(),
        Project::decl(),
        ProjectWithTags::decl(),
        CreateProject::decl(),
        UpdateProject::decl(),
        TaskPriority::decl(),
        TaskStatus::decl(),
        Task::decl(),
        TaskWithRelations::decl(),
        CreateTask::decl(),
        UpdateTask::decl(),
        Tag::decl(),
        CreateTag::decl(),
        UpdateTag::decl(),
        Comment::decl(),
        CreateComment::decl(),
        UpdateComment::decl(),
        ApiResponse::<()>::decl(),
    ];

    let body = decls
        .iter()
        .map(|decl| format!("export {}", decl.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{HEADER}\n{body}\n")
}

fn main() -> anyhow::Result<()> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared/types.ts");
    let generated = generate();

    // `--check` fails when the committed file is stale instead of rewriting it
    if std::env::args().any(|arg| arg == "--check") {
        let current = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if current != generated {
            bail!("{} is out of date; run generate_types", path.display());
        }
        println!("{} is up to date", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, generated).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
