// Kept in sync with the `CREATE TABLE` statements in `manager::SCHEMA`.

diesel::table! {
    students (id) {
        id -> Integer,
        student_id -> Text,
        fullname -> Text,
        group_name -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    courses (id) {
        id -> Integer,
        course_code -> Text,
        course_name -> Text,
    }
}

diesel::table! {
    professors (id) {
        id -> Integer,
        name -> Text,
        email -> Text,
    }
}

diesel::table! {
    attendance_sessions (id) {
        id -> Integer,
        course_id -> Nullable<Integer>,
        group_name -> Nullable<Text>,
        session_date -> Date,
        opened_by -> Nullable<Integer>,
        status -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    attendance_records (id) {
        id -> Integer,
        session_id -> Integer,
        student_id -> Integer,
        status -> Text,
        recorded_at -> Timestamp,
    }
}

diesel::joinable!(attendance_sessions -> courses (course_id));
diesel::joinable!(attendance_sessions -> professors (opened_by));

diesel::allow_tables_to_appear_in_same_query!(
    students,
    courses,
    professors,
    attendance_sessions,
    attendance_records,
);
