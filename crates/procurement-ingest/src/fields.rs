//! Column catalogs: the semantic fields of each source kind and the header
//! spellings seen across exports. Inverted aliases come first so a negated
//! header is never taken for its positive sibling.

use crate::columns::{Alias, FieldSpec};

const fn field(name: &'static str, aliases: &'static [Alias]) -> FieldSpec {
    FieldSpec { name, aliases }
}

pub const DOCUMENT_KIND: &str = "document_kind";
pub const INNER_ID: &str = "inner_id";
pub const NUMBER: &str = "number";
pub const CREATION_DATE: &str = "creation_date";
pub const NAME: &str = "name";
pub const TITLE: &str = "title";
pub const CFO: &str = "cfo";
pub const CUSTOMER: &str = "customer";
pub const BUDGET_AMOUNT: &str = "budget_amount";
pub const CURRENCY: &str = "currency";
pub const REQUIRES_PURCHASE: &str = "requires_purchase";
pub const IS_PLANNED: &str = "is_planned";
pub const PURCHASE_METHOD: &str = "purchase_method";
pub const SUPPLIER: &str = "supplier";
pub const PREPARED_BY: &str = "prepared_by";
pub const STATE: &str = "state";
pub const REQUEST_REFERENCE: &str = "request_reference";
pub const PURCHASE_REFERENCE: &str = "purchase_reference";

pub const DOCUMENT_NUMBER: &str = "document_number";
pub const STAGE: &str = "stage";
pub const ROLE: &str = "role";
pub const ASSIGNEE: &str = "assignee";
pub const ASSIGNMENT_DATE: &str = "assignment_date";
pub const COMPLETION_DATE: &str = "completion_date";
pub const COMPLETION_RESULT: &str = "completion_result";
pub const DAYS_IN_WORK: &str = "days_in_work";

pub const SUBJECT: &str = "subject";
pub const PLAN_YEAR: &str = "plan_year";
pub const COMPANY: &str = "company";
pub const PLANNED_AMOUNT: &str = "planned_amount";
pub const PLANNED_DATE: &str = "planned_date";

const IS_PLANNED_ALIASES: &[Alias] = &[
    Alias::inverted("Внеплановая"),
    Alias::inverted("Внеплановая закупка"),
    Alias::inverted("Unplanned"),
    Alias::normal("Плановая"),
    Alias::normal("Плановая закупка"),
    Alias::normal("Planned"),
];

const PURCHASE_METHOD_ALIASES: &[Alias] = &[
    Alias::normal("Способ закупки"),
    Alias::normal("Способ проведения закупки"),
    Alias::normal("Purchase method"),
];

const CFO_ALIASES: &[Alias] = &[Alias::normal("ЦФО"), Alias::normal("CFO")];

const CURRENCY_ALIASES: &[Alias] = &[Alias::normal("Валюта"), Alias::normal("Currency")];

pub const DOCUMENTS: &[FieldSpec] = &[
    field(
        DOCUMENT_KIND,
        &[
            Alias::normal("Вид документа"),
            Alias::normal("Тип документа"),
            Alias::normal("Document type"),
        ],
    ),
    field(
        INNER_ID,
        &[Alias::normal("Внутренний номер"), Alias::normal("Inner ID"), Alias::normal("GUID")],
    ),
    field(
        NUMBER,
        &[Alias::normal("Номер"), Alias::normal("Номер документа"), Alias::normal("Number")],
    ),
    field(
        CREATION_DATE,
        &[
            Alias::normal("Дата создания"),
            Alias::normal("Дата документа"),
            Alias::normal("Creation date"),
        ],
    ),
    field(NAME, &[Alias::normal("Наименование"), Alias::normal("Name")]),
    field(
        TITLE,
        &[Alias::normal("Заголовок"), Alias::normal("Предмет закупки"), Alias::normal("Title")],
    ),
    field(CFO, CFO_ALIASES),
    field(CUSTOMER, &[Alias::normal("Заказчик"), Alias::normal("Customer")]),
    field(
        BUDGET_AMOUNT,
        &[
            Alias::normal("Сумма бюджета"),
            Alias::normal("Бюджет"),
            Alias::normal("Сумма"),
            Alias::normal("Budget amount"),
        ],
    ),
    field(CURRENCY, CURRENCY_ALIASES),
    field(
        REQUIRES_PURCHASE,
        &[
            Alias::inverted("Закупка не требуется"),
            Alias::inverted("Не требуется закупка"),
            Alias::inverted("Not required for purchase"),
            Alias::normal("Требуется закупка"),
            Alias::normal("Requires purchase"),
        ],
    ),
    field(IS_PLANNED, IS_PLANNED_ALIASES),
    field(PURCHASE_METHOD, PURCHASE_METHOD_ALIASES),
    field(SUPPLIER, &[Alias::normal("Контрагент"), Alias::normal("Поставщик"), Alias::normal("Supplier")]),
    field(
        PREPARED_BY,
        &[Alias::normal("Подготовил"), Alias::normal("Ответственный"), Alias::normal("Prepared by")],
    ),
    field(
        STATE,
        &[Alias::normal("Состояние"), Alias::normal("Статус документа"), Alias::normal("State")],
    ),
    field(
        REQUEST_REFERENCE,
        &[
            Alias::normal("Основание"),
            Alias::normal("Заявка на закупку"),
            Alias::normal("Request reference"),
        ],
    ),
    field(
        PURCHASE_REFERENCE,
        &[
            Alias::normal("Закупочная процедура"),
            Alias::normal("Purchase reference"),
        ],
    ),
];

const APPROVAL_FIELDS_TAIL: [FieldSpec; 7] = [
    field(STAGE, &[Alias::normal("Этап"), Alias::normal("Этап согласования"), Alias::normal("Stage")]),
    field(ROLE, &[Alias::normal("Роль"), Alias::normal("Role")]),
    field(
        ASSIGNEE,
        &[Alias::normal("Исполнитель"), Alias::normal("Согласующий"), Alias::normal("Assignee")],
    ),
    field(
        ASSIGNMENT_DATE,
        &[
            Alias::normal("Дата назначения"),
            Alias::normal("Дата поступления"),
            Alias::normal("Assignment date"),
        ],
    ),
    field(
        COMPLETION_DATE,
        &[
            Alias::normal("Дата выполнения"),
            Alias::normal("Дата завершения"),
            Alias::normal("Completion date"),
        ],
    ),
    field(
        COMPLETION_RESULT,
        &[
            Alias::normal("Результат выполнения"),
            Alias::normal("Результат"),
            Alias::normal("Completion result"),
        ],
    ),
    field(
        DAYS_IN_WORK,
        &[
            Alias::normal("Дней в работе"),
            Alias::normal("Срок в работе"),
            Alias::normal("Days in work"),
        ],
    ),
];

pub const REQUEST_APPROVALS: &[FieldSpec] = &[
    field(
        DOCUMENT_NUMBER,
        &[
            Alias::normal("Номер заявки"),
            Alias::normal("Заявка на закупку"),
            Alias::normal("Request number"),
        ],
    ),
    APPROVAL_FIELDS_TAIL[0],
    APPROVAL_FIELDS_TAIL[1],
    APPROVAL_FIELDS_TAIL[2],
    APPROVAL_FIELDS_TAIL[3],
    APPROVAL_FIELDS_TAIL[4],
    APPROVAL_FIELDS_TAIL[5],
    APPROVAL_FIELDS_TAIL[6],
];

pub const PURCHASE_APPROVALS: &[FieldSpec] = &[
    field(
        DOCUMENT_NUMBER,
        &[
            Alias::normal("Внутренний номер закупки"),
            Alias::normal("Внутренний номер"),
            Alias::normal("Закупочная процедура"),
            Alias::normal("Purchase inner ID"),
        ],
    ),
    APPROVAL_FIELDS_TAIL[0],
    APPROVAL_FIELDS_TAIL[1],
    APPROVAL_FIELDS_TAIL[2],
    APPROVAL_FIELDS_TAIL[3],
    APPROVAL_FIELDS_TAIL[4],
    APPROVAL_FIELDS_TAIL[5],
    APPROVAL_FIELDS_TAIL[6],
];

pub const PLAN_ITEMS: &[FieldSpec] = &[
    field(
        SUBJECT,
        &[
            Alias::normal("Предмет закупки"),
            Alias::normal("Наименование закупки"),
            Alias::normal("Purchase subject"),
        ],
    ),
    field(PLAN_YEAR, &[Alias::normal("Год"), Alias::normal("Год плана"), Alias::normal("Plan year")]),
    field(CFO, CFO_ALIASES),
    field(COMPANY, &[Alias::normal("Организация"), Alias::normal("Компания"), Alias::normal("Company")]),
    field(
        PLANNED_AMOUNT,
        &[
            Alias::normal("Плановая сумма"),
            Alias::normal("Сумма"),
            Alias::normal("Planned amount"),
        ],
    ),
    field(CURRENCY, CURRENCY_ALIASES),
    field(
        PLANNED_DATE,
        &[
            Alias::normal("Планируемая дата"),
            Alias::normal("Дата начала закупки"),
            Alias::normal("Planned date"),
        ],
    ),
    field(PURCHASE_METHOD, PURCHASE_METHOD_ALIASES),
    field(IS_PLANNED, IS_PLANNED_ALIASES),
];
