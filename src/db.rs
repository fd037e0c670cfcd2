use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "curriculum.sqlite3";

const SEED_ROLES: [&str; 3] = ["admin", "teacher", "student"];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    create_schema(&conn)?;
    seed_roles(&conn)?;
    Ok(conn)
}

pub fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    // Array-valued lesson fields hold JSON array text, never NULL.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            language TEXT NOT NULL,
            speciality TEXT,
            grade INTEGER NOT NULL,
            chapter_queue INTEGER NOT NULL,
            chapter TEXT NOT NULL,
            topic_title TEXT NOT NULL DEFAULT '',
            topic_queue INTEGER NOT NULL DEFAULT 0,
            lesson_type TEXT NOT NULL DEFAULT '',
            lesson_objectives TEXT NOT NULL DEFAULT '',
            lesson_equipment TEXT NOT NULL DEFAULT '[]',
            prior_knowledge TEXT NOT NULL DEFAULT '',
            lesson_start TEXT NOT NULL DEFAULT '',
            lesson_middle TEXT NOT NULL DEFAULT '',
            lesson_end TEXT NOT NULL DEFAULT '',
            video_links TEXT NOT NULL DEFAULT '[]',
            presentation_links TEXT NOT NULL DEFAULT '[]',
            link_for_doc TEXT NOT NULL DEFAULT '',
            additional_resources TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_language_grade ON lessons(language, grade)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roles(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_roles(
            user_id TEXT NOT NULL,
            role_id TEXT NOT NULL,
            PRIMARY KEY(user_id, role_id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(role_id) REFERENCES roles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_roles_role ON user_roles(role_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            teacher_id TEXT,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_teacher ON courses(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_students(
            course_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY(course_id, user_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_students_user ON course_students(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS materials(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            course_id TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_materials_course ON materials(course_id)",
        [],
    )?;

    Ok(())
}

fn seed_roles(conn: &Connection) -> anyhow::Result<()> {
    for name in SEED_ROLES {
        conn.execute(
            "INSERT OR IGNORE INTO roles(id, name) VALUES(?, ?)",
            (Uuid::new_v4().to_string(), name),
        )?;
    }
    Ok(())
}
