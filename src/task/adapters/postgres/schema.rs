//! Diesel schema for task and task file persistence.

diesel::table! {
    /// Task records bound to at most one sandbox.
    tasks (id) {
        /// Surrogate row identifier.
        id -> Uuid,
        /// External task identifier, unique across live and deleted rows.
        #[max_length = 128]
        task_id -> Varchar,
        /// Owning organization.
        #[max_length = 64]
        organization_code -> Varchar,
        /// Owning user.
        #[max_length = 64]
        user_id -> Varchar,
        /// Workspace the task runs against.
        #[max_length = 64]
        workspace_id -> Varchar,
        /// Conversation topic.
        #[max_length = 64]
        topic_id -> Varchar,
        /// Assigned sandbox, set at most once.
        #[max_length = 128]
        sandbox_id -> Nullable<Varchar>,
        /// Prompt text.
        prompt -> Text,
        /// Attached input files as a JSON array.
        attachments -> Jsonb,
        /// Lifecycle status code.
        task_status -> Int2,
        /// Working directory inside the sandbox.
        work_dir -> Text,
        /// Execution mode.
        #[max_length = 16]
        task_mode -> Varchar,
        /// Last failure reason.
        error_message -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Soft-deletion timestamp.
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Files produced or consumed by tasks.
    task_files (file_id) {
        /// File identifier.
        file_id -> Uuid,
        /// Owning organization.
        #[max_length = 64]
        organization_code -> Varchar,
        /// Owning user.
        #[max_length = 64]
        user_id -> Varchar,
        /// Conversation topic.
        #[max_length = 64]
        topic_id -> Varchar,
        /// Owning task's external identifier.
        #[max_length = 128]
        task_id -> Varchar,
        /// Origin of the file.
        #[max_length = 32]
        file_type -> Varchar,
        /// Display name.
        file_name -> Text,
        /// Extension without the dot.
        #[max_length = 32]
        file_extension -> Varchar,
        /// Storage-relative path.
        file_key -> Text,
        /// Size in bytes.
        file_size -> Int8,
        /// Publicly reachable URL.
        external_url -> Nullable<Text>,
        /// Display grouping.
        #[max_length = 64]
        menu -> Nullable<Varchar>,
        /// Store holding the bytes.
        #[max_length = 16]
        storage_type -> Varchar,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Soft-deletion timestamp.
        deleted_at -> Nullable<Timestamptz>,
    }
}
