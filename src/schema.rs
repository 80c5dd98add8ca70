// Table definitions matching `DbContext::init_schema`.

diesel::table! {
    archival (resource_id) {
        resource_id -> Text,
        dataset_id -> Text,
        status_id -> Integer,
        reason -> Nullable<Text>,
        url_redirected_to -> Nullable<Text>,
        content_path -> Nullable<Text>,
        content_address -> Nullable<Text>,
        size -> Nullable<BigInt>,
        mime_type -> Nullable<Text>,
        content_hash -> Nullable<Text>,
        etag -> Nullable<Text>,
        last_modified -> Nullable<Text>,
        request_type -> Nullable<Text>,
        first_failure_at -> Nullable<Text>,
        last_success_at -> Nullable<Text>,
        consecutive_failures -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    url_blacklist (prefix) {
        prefix -> Text,
        failure_count -> Integer,
        last_error -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(archival, url_blacklist);
