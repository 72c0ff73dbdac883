use crate::models::Role;

enum Rule {
    Equals(&'static str),
    Contains(&'static str),
}

fn rules(role: Role) -> &'static [Rule] {
    use Rule::{Contains, Equals};

    match role {
        Role::Group => &[Contains("группа")],
        Role::Subject => &[Contains("предмет"), Contains("пара")],
        Role::Topic => &[Contains("тема урока"), Equals("тема")],
        Role::Fio => &[Equals("фио"), Equals("fio")],
        Role::Homework => &[Equals("homework"), Equals("домашняя работа")],
        Role::Classwork => &[Equals("classwork"), Equals("классная работа")],
        Role::Teacher => &[Contains("фио преподавателя")],
        Role::AttendancePercent => &[Contains("средняя посещаемость")],
        Role::CheckedCount => &[Equals("проверено")],
        Role::TotalCount => &[Equals("получено")],
        Role::HomeworkPercent => &[Equals("percentage homework")],
    }
}

pub fn normalize(cell: &str) -> String {
    cell.trim().to_lowercase()
}

impl Role {
    pub fn matches(self, cell: &str) -> bool {
        let cell = normalize(cell);
        rules(self).iter().any(|rule| match rule {
            Rule::Equals(label) => cell == *label,
            Rule::Contains(token) => cell.contains(token),
        })
    }
}
